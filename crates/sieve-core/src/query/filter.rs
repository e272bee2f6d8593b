//! Compilation of query parameters into a scoped filter.
//!
//! Grammar recognized for non-reserved keys:
//!
//! - `field=v` equality (`field=a&field=b` becomes `in`)
//! - `a.b.c=v` equality on a dotted path
//! - `field[op]=v` with `op` one of the allowlisted operators
//! - `field[or]=a,b` one OR group of equalities
//! - `field[and]=a,b` several equalities on the same field
//!
//! Tenant and soft-delete scoping is applied to the result, so the output
//! always carries the caller's tenant whatever the parameters said.

use std::sync::OnceLock;

use regex::Regex;
use sieve_proto::{Constraint, FieldType, FilterExpr, Match, Operator, Value};

use super::coerce::coerce_str;
use super::options::QueryOptions;
use super::spec::{is_reserved, ParamValue, QuerySpec};
use crate::catalog::{EntityDescriptor, FieldTypeProvider};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::security::{apply_soft_delete, apply_tenant_scope, SecurityContext};

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid segment pattern"))
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([^\[\]]+)(?:\[([A-Za-z]+)\])?$").expect("valid key pattern")
    })
}

/// Check that every dotted segment of `path` is a plain identifier.
pub fn validate_field_path(path: &str) -> Result<()> {
    if path.split('.').all(|segment| segment_pattern().is_match(segment)) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid field name '{}'", path)))
    }
}

/// Split `field[suffix]` into its parts.
fn parse_key(key: &str) -> Result<(&str, Option<&str>)> {
    let caps = key_pattern()
        .captures(key)
        .ok_or_else(|| Error::validation(format!("malformed query parameter '{}'", key)))?;
    let field = caps.get(1).map_or("", |m| m.as_str());
    let suffix = caps.get(2).map(|m| m.as_str());
    validate_field_path(field)?;
    Ok((field, suffix))
}

/// Comma-separated items across every value, trimmed, blanks dropped.
fn split_list(value: &ParamValue) -> Vec<&str> {
    value
        .values()
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_blank(value: &ParamValue) -> Vec<&str> {
    value.values().into_iter().filter(|v| !v.is_empty()).collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Check whether `includeDeleted=true` was passed.
pub fn include_deleted_requested(spec: &QuerySpec) -> bool {
    spec.get_str("includeDeleted")
        .and_then(parse_flag)
        .unwrap_or(false)
}

/// Compiles the non-reserved parameters of a spec into a [`FilterExpr`].
pub struct FilterCompiler<'a> {
    entity: &'a EntityDescriptor,
    types: &'a dyn FieldTypeProvider,
    config: &'a EngineConfig,
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler for one entity.
    pub fn new(
        entity: &'a EntityDescriptor,
        types: &'a dyn FieldTypeProvider,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            entity,
            types,
            config,
        }
    }

    fn hint(&self, field: &str) -> Option<FieldType> {
        self.types
            .field_type(&self.entity.name, field)
            .or_else(|| self.entity.field_type(field))
    }

    fn value(&self, field: &str, raw: &str) -> Value {
        coerce_str(raw, self.hint(field))
    }

    /// Compile a sanitized spec.
    pub fn compile(
        &self,
        spec: &QuerySpec,
        ctx: &SecurityContext,
        options: &QueryOptions,
    ) -> Result<FilterExpr> {
        let mut base = Match::new();
        let mut or_groups: Vec<Vec<Match>> = Vec::new();

        for (key, raw) in spec.iter() {
            if is_reserved(key) || raw.is_blank() {
                continue;
            }
            let (field, suffix) = parse_key(key)?;
            match suffix {
                None => base = base.merge(self.equality(field, raw)),
                Some("or") => {
                    if let Some(group) = self.or_group(field, raw)? {
                        or_groups.push(group);
                    }
                }
                Some("and") => {
                    for item in split_list(raw) {
                        base = base.with(field, Constraint::eq(self.value(field, item)));
                    }
                }
                Some(name) => {
                    let op = Operator::parse(name).ok_or_else(|| {
                        Error::validation(format!("operator '{}' is not allowed", name))
                    })?;
                    if !options.permits(op) {
                        return Err(Error::validation(format!(
                            "operator '{}' is not allowed for this request",
                            name
                        )));
                    }
                    for constraint in self.operator(field, op, raw)? {
                        base = base.with(field, constraint);
                    }
                }
            }
        }

        let include_deleted = options.include_deleted || include_deleted_requested(spec);
        let base = apply_tenant_scope(base, self.entity, ctx, options.allow_tenant_override)?;
        let base = apply_soft_delete(base, self.entity, include_deleted);

        if or_groups.is_empty() {
            return Ok(FilterExpr::Match(base));
        }
        let mut parts = vec![FilterExpr::Match(base)];
        parts.extend(or_groups.into_iter().map(FilterExpr::Or));
        Ok(FilterExpr::And(parts))
    }

    fn equality(&self, field: &str, raw: &ParamValue) -> Match {
        let values = non_blank(raw);
        match values.as_slice() {
            [single] => Match::single(field, Constraint::eq(self.value(field, single))),
            many => Match::single(
                field,
                Constraint::in_values(many.iter().map(|v| self.value(field, v)).collect()),
            ),
        }
    }

    fn or_group(&self, field: &str, raw: &ParamValue) -> Result<Option<Vec<Match>>> {
        let items = split_list(raw);
        if items.len() > self.config.max_or_clauses {
            return Err(Error::validation(format!(
                "too many OR clauses for '{}': {} (max {})",
                field,
                items.len(),
                self.config.max_or_clauses
            )));
        }
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            items
                .into_iter()
                .map(|item| Match::single(field, Constraint::eq(self.value(field, item))))
                .collect(),
        ))
    }

    fn operator(&self, field: &str, op: Operator, raw: &ParamValue) -> Result<Vec<Constraint>> {
        match op {
            Operator::In | Operator::Nin => {
                let values: Vec<Value> = split_list(raw)
                    .into_iter()
                    .map(|item| self.value(field, item))
                    .collect();
                if values.is_empty() {
                    return Ok(vec![]);
                }
                Ok(vec![Constraint::new(op, Value::Array(values))])
            }
            Operator::Exists => non_blank(raw)
                .into_iter()
                .map(|item| {
                    parse_flag(item).map(|b| Constraint::new(op, b)).ok_or_else(|| {
                        Error::validation(format!("'{}[exists]' expects true or false", field))
                    })
                })
                .collect(),
            Operator::Regex => non_blank(raw)
                .into_iter()
                .map(|pattern| -> Result<Constraint> {
                    Regex::new(pattern).map_err(|_| {
                        Error::validation(format!("invalid pattern for '{}[regex]'", field))
                    })?;
                    Ok(Constraint::regex(pattern, true))
                })
                .collect(),
            _ => Ok(non_blank(raw)
                .into_iter()
                .map(|item| Constraint::new(op, self.value(field, item)))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use crate::query::sanitize::sanitize;
    use pretty_assertions::assert_eq;

    fn invoice() -> EntityDescriptor {
        EntityDescriptor::new("Invoice")
            .with_tenant_field("tenantId")
            .with_soft_delete("isDeleted")
            .with_fields([
                FieldDef::string("status"),
                FieldDef::number("total"),
                FieldDef::date("issuedAt"),
                FieldDef::string("number"),
            ])
    }

    fn compile(pairs: &[(&str, &str)]) -> Result<FilterExpr> {
        compile_with(pairs, &QueryOptions::default())
    }

    fn compile_with(pairs: &[(&str, &str)], options: &QueryOptions) -> Result<FilterExpr> {
        let entity = invoice();
        let config = EngineConfig::default();
        let spec = sanitize(&QuerySpec::from_pairs(pairs.iter().copied()));
        FilterCompiler::new(&entity, &entity, &config).compile(
            &spec,
            &SecurityContext::for_tenant("t1"),
            options,
        )
    }

    fn scoped() -> Match {
        Match::new()
            .with("isDeleted", Constraint::ne(true))
            .with("tenantId", Constraint::eq("t1"))
    }

    #[test]
    fn test_plain_equality_is_typed() {
        let filter = compile(&[("status", "open"), ("total", "100"), ("page", "2")]).unwrap();
        assert_eq!(
            filter,
            FilterExpr::Match(
                scoped()
                    .with("status", Constraint::eq("open"))
                    .with("total", Constraint::eq(100i64))
            )
        );
    }

    #[test]
    fn test_bracket_operators() {
        let filter = compile(&[
            ("total[gte]", "10"),
            ("total[lt]", "99.5"),
            ("status[in]", "open, paid,"),
            ("number[regex]", "^INV"),
            ("paidAt[exists]", "false"),
        ])
        .unwrap();
        let FilterExpr::Match(m) = filter else {
            panic!("expected a single match");
        };
        assert_eq!(
            m.get("total").unwrap(),
            &[
                Constraint::new(Operator::Gte, 10i64),
                Constraint::new(Operator::Lt, 99.5),
            ]
        );
        assert_eq!(
            m.get("status").unwrap(),
            &[Constraint::in_values(vec!["open".into(), "paid".into()])]
        );
        assert_eq!(m.get("number").unwrap(), &[Constraint::regex("^INV", true)]);
        assert_eq!(m.get("paidAt").unwrap(), &[Constraint::new(Operator::Exists, false)]);
    }

    #[test]
    fn test_disallowed_operator() {
        let err = compile(&[("total[where]", "1")]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("where"));
    }

    #[test]
    fn test_narrowed_operator_allowlist() {
        let options = QueryOptions::new().with_allowed_operators([Operator::Eq, Operator::In]);
        assert!(compile_with(&[("total[gt]", "1")], &options).unwrap_err().is_validation());
        assert!(compile_with(&[("status[in]", "a,b")], &options).is_ok());
        // or/and suffixes are not subject to the narrowed list
        assert!(compile_with(&[("status[or]", "a,b")], &options).is_ok());
    }

    #[test]
    fn test_or_group() {
        let filter = compile(&[("status[or]", "open,paid")]).unwrap();
        assert_eq!(
            filter,
            FilterExpr::And(vec![
                FilterExpr::Match(scoped()),
                FilterExpr::Or(vec![
                    Match::single("status", Constraint::eq("open")),
                    Match::single("status", Constraint::eq("paid")),
                ]),
            ])
        );
    }

    #[test]
    fn test_or_cap() {
        let at_cap: Vec<String> = (0..20).map(|i| format!("s{}", i)).collect();
        assert!(compile(&[("status[or]", &at_cap.join(","))]).is_ok());

        let over: Vec<String> = (0..21).map(|i| format!("s{}", i)).collect();
        let err = compile(&[("status[or]", &over.join(","))]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_and_suffix() {
        let filter = compile(&[("tags[and]", "red,blue")]).unwrap();
        let FilterExpr::Match(m) = filter else {
            panic!("expected a single match");
        };
        assert_eq!(
            m.get("tags").unwrap(),
            &[Constraint::eq("red"), Constraint::eq("blue")]
        );
    }

    #[test]
    fn test_dotted_path_and_repeats() {
        let filter =
            compile(&[("address.city", "Oslo"), ("status", "a"), ("status", "b")]).unwrap();
        let FilterExpr::Match(m) = filter else {
            panic!("expected a single match");
        };
        assert_eq!(m.get("address.city").unwrap(), &[Constraint::eq("Oslo")]);
        assert_eq!(
            m.get("status").unwrap(),
            &[Constraint::in_values(vec!["a".into(), "b".into()])]
        );
    }

    #[test]
    fn test_invalid_field_names() {
        assert!(compile(&[("bad-name", "x")]).unwrap_err().is_validation());
        assert!(compile(&[("a..b", "x")]).unwrap_err().is_validation());
        assert!(compile(&[("total[gt", "x")]).unwrap_err().is_validation());
    }

    #[test]
    fn test_empty_values_skipped() {
        let filter = compile(&[("status", ""), ("total[gt]", "")]).unwrap();
        assert_eq!(filter, FilterExpr::Match(scoped()));
    }

    #[test]
    fn test_tenant_conflict() {
        assert!(compile(&[("tenantId", "t2")]).unwrap_err().is_validation());
        assert_eq!(compile(&[("tenantId", "t1")]).unwrap(), FilterExpr::Match(scoped()));
    }

    #[test]
    fn test_include_deleted() {
        let filter = compile(&[("includeDeleted", "true")]).unwrap();
        assert_eq!(
            filter,
            FilterExpr::Match(Match::single("tenantId", Constraint::eq("t1")))
        );
        let filter = compile(&[("isDeleted", "true")]).unwrap();
        let FilterExpr::Match(m) = filter else {
            panic!("expected a single match");
        };
        assert_eq!(m.get("isDeleted").unwrap(), &[Constraint::eq(true)]);
    }

    #[test]
    fn test_where_injection_stripped() {
        let filter = compile(&[("status", "open$where"), ("$where", "sleep(1000)")]).unwrap();
        assert_eq!(
            filter,
            FilterExpr::Match(scoped().with("status", Constraint::eq("open")))
        );
    }
}
