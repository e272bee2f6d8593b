//! Page window resolution.
//!
//! Offset pagination slices by `page`/`limit` and needs a count. Cursor
//! pagination slices by "strictly beyond the last seen `(key, identity)`
//! pair" and fetches one extra row instead of counting.

use serde::{Deserialize, Serialize};
use sieve_proto::{
    Constraint, FieldType, FilterExpr, Match, Operator, PaginationMeta, PaginationState,
    SortDirection, SortSpec,
};

use super::coerce::coerce_str;
use super::filter::validate_field_path;
use super::json_path;
use super::sort::with_tie_break;
use super::spec::QuerySpec;
use crate::catalog::{EntityDescriptor, FieldTypeProvider};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// How a listing is sliced into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationStrategy {
    /// `page`/`limit` with a total count.
    #[default]
    Offset,
    /// `cursor`/`lastId` keyset slicing.
    Cursor,
    /// Alias of [`PaginationStrategy::Cursor`].
    Keyset,
}

/// Resolved window plus the adjustments it makes to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationPlan {
    /// Window state.
    pub state: PaginationState,
    /// Effective ordering (cursor pagination rewrites it).
    pub sort: Vec<SortSpec>,
    /// Cursor constraint to AND with the filter.
    pub constraint: Option<FilterExpr>,
    /// Field clients read the next cursor from, under the cursor strategies.
    pub cursor_field: Option<String>,
    /// Rows to skip.
    pub skip: u64,
    /// Rows to fetch (`limit + 1` for cursors).
    pub fetch_limit: u64,
}

fn parse_positive(spec: &QuerySpec, key: &str) -> Result<Option<u64>> {
    let Some(raw) = spec.get_str(key) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(Error::validation(format!(
            "'{}' must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

/// Page size: default when absent, clamped to the maximum.
pub fn parse_limit(spec: &QuerySpec, config: &EngineConfig) -> Result<u64> {
    Ok(parse_positive(spec, "limit")?
        .unwrap_or(config.default_limit)
        .min(config.max_limit))
}

/// One-based page number.
pub fn parse_page(spec: &QuerySpec) -> Result<u64> {
    Ok(parse_positive(spec, "page")?.unwrap_or(1))
}

/// Resolve the page window for a request.
///
/// Under the cursor strategies every page, the cursor-less first one
/// included, is ordered by `[cursor field, identity]` so that a cursor taken
/// from one page continues exactly where an offset slice would.
pub fn resolve(
    spec: &QuerySpec,
    strategy: PaginationStrategy,
    sort: Vec<SortSpec>,
    entity: &EntityDescriptor,
    types: &dyn FieldTypeProvider,
    config: &EngineConfig,
) -> Result<PaginationPlan> {
    let limit = parse_limit(spec, config)?;
    let page = parse_page(spec)?;

    let (sort, key) = match strategy {
        PaginationStrategy::Offset => (sort, None),
        PaginationStrategy::Cursor | PaginationStrategy::Keyset => {
            let key = keyset_key(spec, &sort, entity)?;
            (with_tie_break(vec![key.clone()], &entity.id_field), Some(key))
        }
    };

    let cursor = spec.get_str("cursor");
    let last_id = spec.get_str("lastId");
    if let Some(key) = &key {
        if cursor.is_some() || last_id.is_some() {
            return cursor_plan(key, cursor, last_id, limit, sort, entity, types);
        }
    }

    let skip = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| Error::validation(format!("page {} is out of range", page)))?;
    Ok(PaginationPlan {
        state: PaginationState::Offset { page, limit, skip },
        sort,
        constraint: None,
        cursor_field: key.map(|k| k.field),
        skip,
        fetch_limit: limit,
    })
}

/// Ordering key for cursor pages: `cursorField`, else the primary sort field.
/// The direction is always the primary sort direction.
fn keyset_key(spec: &QuerySpec, sort: &[SortSpec], entity: &EntityDescriptor) -> Result<SortSpec> {
    let primary = sort.first();
    let direction = primary.map_or(SortDirection::Desc, |p| p.direction);

    let Some(field) = spec.get_str("cursorField") else {
        let field = primary.map_or(entity.id_field.clone(), |p| p.field.clone());
        return Ok(SortSpec { field, direction });
    };
    validate_field_path(field)?;
    if !entity.is_sortable(field) {
        return Err(Error::validation(format!(
            "cannot page {} by '{}'",
            entity.name, field
        )));
    }
    Ok(SortSpec {
        field: field.to_string(),
        direction,
    })
}

fn cursor_plan(
    key: &SortSpec,
    cursor: Option<&str>,
    last_id: Option<&str>,
    limit: u64,
    sort: Vec<SortSpec>,
    entity: &EntityDescriptor,
    types: &dyn FieldTypeProvider,
) -> Result<PaginationPlan> {
    let id_field = entity.id_field.as_str();
    let hint = |field: &str| -> Option<FieldType> {
        types
            .field_type(&entity.name, field)
            .or_else(|| entity.field_type(field))
    };
    let op = match key.direction {
        SortDirection::Desc => Operator::Lt,
        SortDirection::Asc => Operator::Gt,
    };

    let (cursor_value, last_id, constraint) = if key.field == id_field {
        let raw = cursor.or(last_id).unwrap_or_default();
        let value = coerce_str(raw, hint(id_field));
        let constraint = Match::single(id_field, Constraint::new(op, value.clone()));
        (value, None, FilterExpr::Match(constraint))
    } else {
        // Keys may repeat, so rows equal to the cursor are split by identity.
        let (Some(raw), Some(raw_id)) = (cursor, last_id) else {
            return Err(Error::validation(format!(
                "paging {} by '{}' needs both 'cursor' and 'lastId'",
                entity.name, key.field
            )));
        };
        let value = coerce_str(raw, hint(&key.field));
        let id = coerce_str(raw_id, hint(id_field));
        let constraint = FilterExpr::Or(vec![
            Match::single(key.field.clone(), Constraint::new(op, value.clone())),
            Match::single(key.field.clone(), Constraint::eq(value.clone()))
                .with(id_field, Constraint::new(op, id.clone())),
        ]);
        (value, Some(id), constraint)
    };

    Ok(PaginationPlan {
        state: PaginationState::Cursor {
            cursor_field: key.field.clone(),
            cursor_value,
            last_id,
            direction: key.direction,
            limit,
        },
        sort,
        constraint: Some(constraint),
        cursor_field: Some(key.field.clone()),
        skip: 0,
        fetch_limit: limit.saturating_add(1),
    })
}

/// Build pagination metadata from fetched rows, trimming the look-ahead row
/// of a cursor page.
pub fn page_meta(
    state: &PaginationState,
    rows: &mut Vec<serde_json::Value>,
    total: Option<u64>,
    id_field: &str,
) -> PaginationMeta {
    match state {
        PaginationState::Offset { page, limit, .. } => {
            PaginationMeta::offset(*page, *limit, total.unwrap_or(rows.len() as u64))
        }
        PaginationState::Cursor {
            cursor_field,
            limit,
            ..
        } => {
            let has_next = rows.len() as u64 > *limit;
            rows.truncate(*limit as usize);
            let last = rows.last().filter(|_| has_next);
            let next_cursor = last.and_then(|row| json_path(row, cursor_field)).cloned();
            let next_last_id = last
                .filter(|_| cursor_field != id_field)
                .and_then(|row| json_path(row, id_field))
                .cloned();
            PaginationMeta::Cursor {
                limit: *limit,
                cursor_field: cursor_field.clone(),
                has_next,
                has_prev: true,
                next_cursor,
                next_last_id,
            }
        }
    }
}
