//! Compiled filter AST.
//!
//! A compiled filter is a small recursive tree:
//! - [`FilterExpr::Match`] holds a flat mapping of field path to constraints
//! - [`FilterExpr::Or`] holds alternative matches, at least one must hold
//! - [`FilterExpr::And`] holds sub-expressions that must all hold
//!
//! Trees are built functionally and never mutated after construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Member of a list.
    In,
    /// Not a member of a list.
    Nin,
    /// Regular expression match.
    Regex,
    /// Field presence.
    Exists,
}

impl Operator {
    /// Every operator, in declaration order.
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
        Operator::Regex,
        Operator::Exists,
    ];

    /// Query-string spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Regex => "regex",
            Operator::Exists => "exists",
        }
    }

    /// Parse the query-string spelling.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::Nin => "NOT IN",
            Operator::Regex => "~",
            Operator::Exists => "EXISTS",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operator applied to one coerced value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// The operator.
    pub op: Operator,
    /// The operand.
    pub value: Value,
}

impl Constraint {
    /// Create a constraint.
    pub fn new(op: Operator, value: impl Into<Value>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }

    /// Equality constraint.
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::new(Operator::Eq, value)
    }

    /// Inequality constraint.
    pub fn ne(value: impl Into<Value>) -> Self {
        Self::new(Operator::Ne, value)
    }

    /// Greater-than constraint.
    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new(Operator::Gt, value)
    }

    /// Less-than constraint.
    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new(Operator::Lt, value)
    }

    /// Membership constraint.
    pub fn in_values(values: Vec<Value>) -> Self {
        Self::new(Operator::In, Value::Array(values))
    }

    /// Regex constraint.
    pub fn regex(pattern: impl Into<String>, case_insensitive: bool) -> Self {
        Self::new(Operator::Regex, Value::regex(pattern, case_insensitive))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.symbol(), self.value)
    }
}

/// Flat mapping of dotted field path to constraints; all must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Match {
    conditions: BTreeMap<String, Vec<Constraint>>,
}

impl Match {
    /// Empty match (matches every record).
    pub fn new() -> Self {
        Self::default()
    }

    /// Match with a single constraint.
    pub fn single(field: impl Into<String>, constraint: Constraint) -> Self {
        Self::new().with(field, constraint)
    }

    /// Return a match extended with one more constraint on `field`.
    pub fn with(mut self, field: impl Into<String>, constraint: Constraint) -> Self {
        self.conditions
            .entry(field.into())
            .or_default()
            .push(constraint);
        self
    }

    /// Return the union of two matches' constraints.
    pub fn merge(mut self, other: Match) -> Self {
        for (field, constraints) in other.conditions {
            self.conditions.entry(field).or_default().extend(constraints);
        }
        self
    }

    /// Return a match without any constraints on `field`.
    pub fn without(mut self, field: &str) -> Self {
        self.conditions.remove(field);
        self
    }

    /// Constraints on a field.
    pub fn get(&self, field: &str) -> Option<&[Constraint]> {
        self.conditions.get(field).map(Vec::as_slice)
    }

    /// Check whether any constraint targets `field`.
    pub fn contains_field(&self, field: &str) -> bool {
        self.conditions.contains_key(field)
    }

    /// Iterate over `(field, constraints)` in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Constraint])> {
        self.conditions
            .iter()
            .map(|(field, constraints)| (field.as_str(), constraints.as_slice()))
    }

    /// Number of constrained fields.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Check if the match has no constraints.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("TRUE");
        }
        let mut first = true;
        for (field, constraints) in self.iter() {
            for constraint in constraints {
                if !first {
                    f.write_str(" AND ")?;
                }
                first = false;
                write!(f, "{} {}", field, constraint)?;
            }
        }
        Ok(())
    }
}

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterExpr {
    /// All constraints of the match hold.
    Match(Match),
    /// At least one of the matches holds.
    Or(Vec<Match>),
    /// Every sub-expression holds.
    And(Vec<FilterExpr>),
}

impl Default for FilterExpr {
    fn default() -> Self {
        FilterExpr::Match(Match::new())
    }
}

impl From<Match> for FilterExpr {
    fn from(m: Match) -> Self {
        FilterExpr::Match(m)
    }
}

impl FilterExpr {
    /// Filter that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Conjunction of expressions.
    ///
    /// Nested `And`s are flattened and empty matches dropped; a single
    /// remaining expression is returned as-is.
    pub fn and(exprs: impl IntoIterator<Item = FilterExpr>) -> Self {
        let mut flat = Vec::new();
        for expr in exprs {
            match expr {
                FilterExpr::And(children) => flat.extend(children),
                FilterExpr::Match(m) if m.is_empty() => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => FilterExpr::all(),
            1 => flat.remove(0),
            _ => FilterExpr::And(flat),
        }
    }

    /// Check whether this expression matches every record.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterExpr::Match(m) => m.is_empty(),
            FilterExpr::Or(_) => false,
            FilterExpr::And(children) => children.iter().all(FilterExpr::is_empty),
        }
    }

    /// Check whether any match in the tree constrains `field`.
    pub fn references_field(&self, field: &str) -> bool {
        match self {
            FilterExpr::Match(m) => m.contains_field(field),
            FilterExpr::Or(matches) => matches.iter().any(|m| m.contains_field(field)),
            FilterExpr::And(children) => children.iter().any(|c| c.references_field(field)),
        }
    }

    /// All field paths referenced by the expression.
    pub fn fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            FilterExpr::Match(m) => fields.extend(m.iter().map(|(f, _)| f.to_string())),
            FilterExpr::Or(matches) => {
                for m in matches {
                    fields.extend(m.iter().map(|(f, _)| f.to_string()));
                }
            }
            FilterExpr::And(children) => {
                for child in children {
                    child.collect_fields(fields);
                }
            }
        }
    }

    /// Largest `Or` group anywhere in the tree.
    pub fn max_or_width(&self) -> usize {
        match self {
            FilterExpr::Match(_) => 0,
            FilterExpr::Or(matches) => matches.len(),
            FilterExpr::And(children) => children
                .iter()
                .map(FilterExpr::max_or_width)
                .max()
                .unwrap_or(0),
        }
    }

    /// Every operator used in the tree.
    pub fn operators(&self) -> BTreeSet<Operator> {
        let mut ops = BTreeSet::new();
        self.collect_operators(&mut ops);
        ops
    }

    fn collect_operators(&self, ops: &mut BTreeSet<Operator>) {
        fn from_match(m: &Match, ops: &mut BTreeSet<Operator>) {
            for (_, constraints) in m.iter() {
                ops.extend(constraints.iter().map(|c| c.op));
            }
        }
        match self {
            FilterExpr::Match(m) => from_match(m, ops),
            FilterExpr::Or(matches) => {
                for m in matches {
                    from_match(m, ops);
                }
            }
            FilterExpr::And(children) => {
                for child in children {
                    child.collect_operators(ops);
                }
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Match(m) => write!(f, "{}", m),
            FilterExpr::Or(matches) => {
                f.write_str("(")?;
                for (i, m) in matches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{}", m)?;
                }
                f.write_str(")")
            }
            FilterExpr::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
        }
    }
}
