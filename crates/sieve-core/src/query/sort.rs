//! `sort=` and `fields=`/`select=` compilation.

use sieve_proto::{SortDirection, SortSpec};

use super::filter::validate_field_path;
use super::spec::QuerySpec;
use crate::catalog::{EntityDescriptor, ALWAYS_SELECTABLE};
use crate::error::{Error, Result};

/// Append the identity tie-break unless it is already part of the ordering.
///
/// The tie-break follows the primary direction so that equal keys keep a
/// stable order across pages.
pub fn with_tie_break(mut sort: Vec<SortSpec>, id_field: &str) -> Vec<SortSpec> {
    if sort.iter().any(|s| s.field == id_field) {
        return sort;
    }
    let direction = sort
        .first()
        .map_or(SortDirection::Desc, |primary| primary.direction);
    sort.push(SortSpec {
        field: id_field.to_string(),
        direction,
    });
    sort
}

/// Compile `sort=-createdAt,name`.
///
/// A field outside the entity's sortable allowlist is rejected. An empty
/// sort falls back to the entity's default, then to the identity field
/// descending.
pub fn compile_sort(spec: &QuerySpec, entity: &EntityDescriptor) -> Result<Vec<SortSpec>> {
    let mut sort: Vec<SortSpec> = Vec::new();

    for raw in spec.get("sort").map(|v| v.values()).unwrap_or_default() {
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (field, direction) = match item.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (item.strip_prefix('+').unwrap_or(item), SortDirection::Asc),
            };
            validate_field_path(field)?;
            if !entity.is_sortable(field) {
                return Err(Error::validation(format!(
                    "cannot sort {} by '{}'",
                    entity.name, field
                )));
            }
            if sort.iter().all(|s| s.field != field) {
                sort.push(SortSpec {
                    field: field.to_string(),
                    direction,
                });
            }
        }
    }

    if sort.is_empty() {
        sort = entity.default_sort.clone();
    }
    if sort.is_empty() {
        sort.push(SortSpec::desc(entity.id_field.as_str()));
    }
    Ok(with_tie_break(sort, &entity.id_field))
}

/// Compile `fields=`/`select=` into a projection.
///
/// Fields outside the allowlist are dropped silently. The identity field is
/// always projected. When nothing selectable was asked for, an entity with a
/// selectable allowlist projects the whole allowlist; one without gets `None`.
pub fn compile_select(spec: &QuerySpec, entity: &EntityDescriptor) -> Option<Vec<String>> {
    let requested = spec
        .get("fields")
        .or_else(|| spec.get("select"))
        .map(|v| v.values())
        .unwrap_or_default();

    let mut fields: Vec<String> = Vec::new();
    for item in requested.into_iter().flat_map(|v| v.split(',')).map(str::trim) {
        if item.is_empty() || validate_field_path(item).is_err() || !entity.is_selectable(item) {
            continue;
        }
        push_unique(&mut fields, item);
    }

    if fields.is_empty() {
        let allowed = entity.selectable_fields.as_ref()?;
        for field in ALWAYS_SELECTABLE.iter().copied().chain(allowed.iter().map(String::as_str)) {
            push_unique(&mut fields, field);
        }
    }
    if !fields.contains(&entity.id_field) {
        fields.insert(0, entity.id_field.clone());
    }
    Some(fields)
}

fn push_unique(fields: &mut Vec<String>, field: &str) {
    if !fields.iter().any(|f| f == field) {
        fields.push(field.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn product() -> EntityDescriptor {
        EntityDescriptor::new("Product")
            .with_sortable(["name", "price", "createdAt"])
            .with_selectable(["name", "price"])
    }

    fn spec(pairs: &[(&str, &str)]) -> QuerySpec {
        QuerySpec::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_sort_with_tie_break() {
        let sort = compile_sort(&spec(&[("sort", "-createdAt,name")]), &product()).unwrap();
        assert_eq!(
            sort,
            vec![
                SortSpec::desc("createdAt"),
                SortSpec::asc("name"),
                SortSpec::desc("_id"),
            ]
        );
    }

    #[test]
    fn test_sort_dedupes_and_keeps_explicit_id() {
        let sort = compile_sort(&spec(&[("sort", "price,-price,_id")]), &product()).unwrap();
        assert_eq!(sort, vec![SortSpec::asc("price"), SortSpec::asc("_id")]);
    }

    #[test]
    fn test_sort_rejects_unlisted_field() {
        let err = compile_sort(&spec(&[("sort", "costPrice")]), &product()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_default_sort() {
        assert_eq!(
            compile_sort(&QuerySpec::new(), &product()).unwrap(),
            vec![SortSpec::desc("_id")]
        );

        let entity = product().with_default_sort(vec![SortSpec::asc("name")]);
        assert_eq!(
            compile_sort(&QuerySpec::new(), &entity).unwrap(),
            vec![SortSpec::asc("name"), SortSpec::asc("_id")]
        );
    }

    #[test]
    fn test_select_drops_disallowed() {
        let projection =
            compile_select(&spec(&[("fields", "name,costPrice,createdAt")]), &product());
        assert_eq!(
            projection,
            Some(vec!["_id".to_string(), "name".to_string(), "createdAt".to_string()])
        );
    }

    #[test]
    fn test_select_alias_and_empty() {
        assert_eq!(
            compile_select(&spec(&[("select", "price")]), &product()),
            Some(vec!["_id".to_string(), "price".to_string()])
        );
    }

    #[test]
    fn test_select_falls_back_to_allowlist() {
        let allowlist = Some(vec![
            "_id".to_string(),
            "createdAt".to_string(),
            "updatedAt".to_string(),
            "name".to_string(),
            "price".to_string(),
        ]);
        assert_eq!(compile_select(&spec(&[("fields", "secret")]), &product()), allowlist);
        assert_eq!(compile_select(&QuerySpec::new(), &product()), allowlist);

        let open = EntityDescriptor::new("Note");
        assert_eq!(compile_select(&QuerySpec::new(), &open), None);
    }
}
