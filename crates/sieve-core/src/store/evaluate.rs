//! Filter, sort and projection evaluation over JSON documents.
//!
//! Semantics follow document stores: a dotted path fans out through arrays,
//! equality against an array field matches any element, a missing field
//! fails every comparison, and `ne`/`nin` match a missing field.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value as Json};
use sieve_proto::{FilterExpr, Match, Operator, SortDirection, SortSpec, Value};

use crate::error::StoreError;
use crate::query::coerce::parse_date;

/// Every value reachable at a dotted path, fanning out through arrays.
///
/// An array found at the end of the path is returned as one value; callers
/// decide whether to look inside it.
pub fn resolve<'a>(doc: &'a Json, path: &str) -> Vec<&'a Json> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Json::Object(map) => next.extend(map.get(segment)),
                Json::Array(items) => {
                    for item in items {
                        if let Json::Object(map) = item {
                            next.extend(map.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Candidate scalars for comparison: each resolved value plus the elements
/// of resolved arrays.
fn candidates<'a>(resolved: &[&'a Json]) -> Vec<&'a Json> {
    let mut out = Vec::with_capacity(resolved.len());
    for value in resolved {
        if let Json::Array(items) = value {
            out.extend(items.iter());
        }
        out.push(value);
    }
    out
}

fn any_ordered(values: Vec<&Json>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|v| compare(v, operand).is_some_and(accept))
}

/// Order a stored value against a constraint operand.
///
/// `None` when the two are not comparable.
pub fn compare(stored: &Json, operand: &Value) -> Option<Ordering> {
    match (stored, operand) {
        (Json::Null, Value::Null) => Some(Ordering::Equal),
        (Json::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Json::Number(n), Value::Int(i)) => match n.as_i64() {
            Some(a) => Some(a.cmp(i)),
            None => n.as_f64()?.partial_cmp(&(*i as f64)),
        },
        (Json::Number(n), Value::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Json::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Json::String(a), Value::Reference(r)) => Some(a.to_ascii_lowercase().cmp(&r.to_hex())),
        (Json::String(a), Value::Date(d)) => parse_date(a).map(|stored| stored.cmp(d)),
        _ => None,
    }
}

fn equals(stored: &Json, operand: &Value) -> bool {
    compare(stored, operand) == Some(Ordering::Equal)
}

fn operand_list(operand: &Value) -> &[Value] {
    match operand {
        Value::Array(values) => values,
        single => std::slice::from_ref(single),
    }
}

enum Predicate {
    Compare(Operator, Value),
    Pattern(Regex),
}

impl Predicate {
    fn new(op: Operator, value: &Value) -> Result<Self, StoreError> {
        if let (Operator::Regex, Value::Regex { pattern, case_insensitive }) = (op, value) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| StoreError::Rejected(format!("bad pattern '{}': {}", pattern, e)))?;
            return Ok(Predicate::Pattern(regex));
        }
        Ok(Predicate::Compare(op, value.clone()))
    }

    fn test(&self, resolved: &[&Json]) -> bool {
        let values = candidates(resolved);
        match self {
            Predicate::Pattern(regex) => values
                .iter()
                .any(|v| v.as_str().is_some_and(|s| regex.is_match(s))),
            Predicate::Compare(op, operand) => match op {
                Operator::Eq => values.iter().any(|v| equals(v, operand)),
                Operator::Ne => !values.iter().any(|v| equals(v, operand)),
                Operator::In => {
                    let list = operand_list(operand);
                    values.iter().any(|v| list.iter().any(|o| equals(v, o)))
                }
                Operator::Nin => {
                    let list = operand_list(operand);
                    !values.iter().any(|v| list.iter().any(|o| equals(v, o)))
                }
                Operator::Exists => operand.as_bool().unwrap_or(true) != resolved.is_empty(),
                Operator::Gt => any_ordered(values, operand, Ordering::is_gt),
                Operator::Gte => any_ordered(values, operand, Ordering::is_ge),
                Operator::Lt => any_ordered(values, operand, Ordering::is_lt),
                Operator::Lte => any_ordered(values, operand, Ordering::is_le),
                // A regex operator whose operand is not a pattern matches nothing.
                Operator::Regex => false,
            },
        }
    }
}

struct CompiledMatch {
    conditions: Vec<(String, Vec<Predicate>)>,
}

impl CompiledMatch {
    fn new(m: &Match) -> Result<Self, StoreError> {
        let mut conditions = Vec::with_capacity(m.len());
        for (field, constraints) in m.iter() {
            let predicates = constraints
                .iter()
                .map(|c| Predicate::new(c.op, &c.value))
                .collect::<Result<Vec<_>, _>>()?;
            conditions.push((field.to_string(), predicates));
        }
        Ok(Self { conditions })
    }

    fn matches(&self, doc: &Json) -> bool {
        self.conditions.iter().all(|(field, predicates)| {
            let resolved = resolve(doc, field);
            predicates.iter().all(|p| p.test(&resolved))
        })
    }
}

enum Node {
    Match(CompiledMatch),
    Or(Vec<CompiledMatch>),
    And(Vec<Node>),
}

/// A filter with its patterns compiled once, reusable across documents.
pub struct FilterMatcher {
    root: Node,
}

impl FilterMatcher {
    /// Compile a filter. Fails if a pattern does not compile.
    pub fn new(filter: &FilterExpr) -> Result<Self, StoreError> {
        Ok(Self {
            root: Self::compile(filter)?,
        })
    }

    fn compile(filter: &FilterExpr) -> Result<Node, StoreError> {
        Ok(match filter {
            FilterExpr::Match(m) => Node::Match(CompiledMatch::new(m)?),
            FilterExpr::Or(matches) => Node::Or(
                matches
                    .iter()
                    .map(CompiledMatch::new)
                    .collect::<Result<_, _>>()?,
            ),
            FilterExpr::And(children) => Node::And(
                children
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Check a document.
    pub fn matches(&self, doc: &Json) -> bool {
        fn eval(node: &Node, doc: &Json) -> bool {
            match node {
                Node::Match(m) => m.matches(doc),
                Node::Or(matches) => matches.iter().any(|m| m.matches(doc)),
                Node::And(children) => children.iter().all(|c| eval(c, doc)),
            }
        }
        eval(&self.root, doc)
    }
}

fn type_rank(value: Option<&Json>) -> u8 {
    match value {
        None | Some(Json::Null) => 0,
        Some(Json::Number(_)) => 1,
        Some(Json::String(_)) => 2,
        Some(Json::Object(_)) => 3,
        Some(Json::Array(_)) => 4,
        Some(Json::Bool(_)) => 5,
    }
}

fn compare_json(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    match (a, b) {
        (Some(Json::Number(x)), Some(Json::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Order two documents by a sort specification. Missing and null sort first
/// ascending.
pub fn compare_documents(a: &Json, b: &Json, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let left = resolve(a, &spec.field).into_iter().next();
        let right = resolve(b, &spec.field).into_iter().next();
        let ord = match spec.direction {
            SortDirection::Asc => compare_json(left, right),
            SortDirection::Desc => compare_json(right, left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn insert_path(target: &mut Map<String, Json>, path: &str, value: Json) {
    match path.split_once('.') {
        None => {
            target.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if let Json::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Keep only the listed field paths of a document.
pub fn project(doc: &Json, fields: &[String]) -> Json {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = crate::query::json_path(doc, field) {
            insert_path(&mut out, field, value.clone());
        }
    }
    Json::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sieve_proto::{Constraint, RefId};

    fn matches(filter: impl Into<FilterExpr>, doc: &Json) -> bool {
        FilterMatcher::new(&filter.into()).unwrap().matches(doc)
    }

    #[test]
    fn test_eq_and_ne() {
        let doc = json!({"status": "open", "total": 40});
        assert!(matches(Match::single("status", Constraint::eq("open")), &doc));
        assert!(!matches(Match::single("status", Constraint::eq("closed")), &doc));
        assert!(matches(Match::single("total", Constraint::eq(40)), &doc));
        assert!(matches(Match::single("total", Constraint::eq(40.0)), &doc));
        assert!(matches(Match::single("status", Constraint::ne("closed")), &doc));
    }

    #[test]
    fn test_missing_field_semantics() {
        let doc = json!({"name": "a"});
        assert!(!matches(Match::single("total", Constraint::gt(1)), &doc));
        assert!(!matches(Match::single("total", Constraint::eq(1)), &doc));
        assert!(matches(Match::single("isDeleted", Constraint::ne(true)), &doc));
        assert!(matches(
            Match::single("total", Constraint::new(Operator::Nin, Value::Array(vec![1.into()]))),
            &doc
        ));
        assert!(matches(Match::single("total", Constraint::new(Operator::Exists, false)), &doc));
        assert!(!matches(Match::single("total", Constraint::new(Operator::Exists, true)), &doc));
    }

    #[test]
    fn test_array_fields() {
        let doc = json!({"tags": ["red", "blue"], "items": [{"sku": "A1"}, {"sku": "B2"}]});
        assert!(matches(Match::single("tags", Constraint::eq("blue")), &doc));
        assert!(matches(Match::single("items.sku", Constraint::eq("B2")), &doc));
        assert!(!matches(Match::single("tags", Constraint::ne("red")), &doc));
        assert!(matches(
            Match::single("tags", Constraint::in_values(vec!["green".into(), "red".into()])),
            &doc
        ));
    }

    #[test]
    fn test_ranges_dates_and_references() {
        let doc = json!({
            "createdAt": "2024-03-01T12:00:00.000Z",
            "customerId": "65a1b2c3d4e5f60718293a4b",
            "total": 12.5
        });
        let date = parse_date("2024-01-01").unwrap();
        assert!(matches(Match::single("createdAt", Constraint::gt(date)), &doc));
        assert!(!matches(Match::single("createdAt", Constraint::lt(date)), &doc));

        let id = RefId::parse_hex("65A1B2C3D4E5F60718293A4B").unwrap();
        assert!(matches(Match::single("customerId", Constraint::eq(id)), &doc));

        assert!(matches(
            Match::new()
                .with("total", Constraint::new(Operator::Gte, 12.5))
                .with("total", Constraint::new(Operator::Lte, 13)),
            &doc
        ));
    }

    #[test]
    fn test_regex_and_or() {
        let doc = json!({"name": "Blue Widget", "sku": "W-1"});
        assert!(matches(Match::single("name", Constraint::regex("widget", true)), &doc));
        assert!(!matches(Match::single("name", Constraint::regex("widget", false)), &doc));

        let or = FilterExpr::Or(vec![
            Match::single("sku", Constraint::eq("X")),
            Match::single("name", Constraint::regex("^blue", true)),
        ]);
        assert!(matches(or.clone(), &doc));
        let and = FilterExpr::And(vec![or, Match::single("sku", Constraint::eq("nope")).into()]);
        assert!(!matches(and, &doc));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let filter: FilterExpr = Match::single("name", Constraint::regex("(", false)).into();
        assert!(matches!(FilterMatcher::new(&filter), Err(StoreError::Rejected(_))));
    }

    #[test]
    fn test_sort_order() {
        let mut docs = vec![
            json!({"_id": "c", "rank": 2}),
            json!({"_id": "a", "rank": 1}),
            json!({"_id": "b"}),
            json!({"_id": "d", "rank": 2}),
        ];
        let sort = vec![SortSpec::asc("rank"), SortSpec::desc("_id")];
        docs.sort_by(|a, b| compare_documents(a, b, &sort));
        let ids: Vec<&str> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn test_project_nested() {
        let doc = json!({"_id": "1", "name": "x", "address": {"city": "Oslo", "zip": "0150"}});
        let projected = project(&doc, &["_id".into(), "address.city".into(), "missing".into()]);
        assert_eq!(projected, json!({"_id": "1", "address": {"city": "Oslo"}}));
    }
}
