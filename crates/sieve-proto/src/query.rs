//! Query IR handed to the datastore.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::FilterExpr;
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Ordering on one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field path to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Ascending sort.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{}", self.field),
            SortDirection::Desc => write!(f, "-{}", self.field),
        }
    }
}

/// Which datastore capability runs the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    /// Plain `find` with sort/skip/limit/projection.
    #[default]
    Find,
    /// Aggregation pipeline.
    Aggregate,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Find => f.write_str("find"),
            ExecutionPath::Aggregate => f.write_str("aggregate"),
        }
    }
}

/// Resolved page window for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaginationState {
    /// Page/skip/limit slicing.
    Offset {
        /// One-based page number.
        page: u64,
        /// Page size.
        limit: u64,
        /// Rows skipped before the page.
        skip: u64,
    },
    /// Slicing by values strictly beyond the last seen key.
    Cursor {
        /// Field the cursor value refers to.
        cursor_field: String,
        /// Last value seen by the client.
        cursor_value: Value,
        /// Identity of the last row seen, when the cursor field is not the identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_id: Option<Value>,
        /// Traversal direction.
        direction: SortDirection,
        /// Page size.
        limit: u64,
    },
}

impl PaginationState {
    /// First offset page.
    pub fn first_page(limit: u64) -> Self {
        PaginationState::Offset {
            page: 1,
            limit,
            skip: 0,
        }
    }

    /// Page size.
    pub fn limit(&self) -> u64 {
        match self {
            PaginationState::Offset { limit, .. } | PaginationState::Cursor { limit, .. } => *limit,
        }
    }

    /// Check if this is a cursor window.
    pub fn is_cursor(&self) -> bool {
        matches!(self, PaginationState::Cursor { .. })
    }
}

/// A `find` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindQuery {
    /// Filter to apply.
    pub filter: FilterExpr,
    /// Ordering.
    pub sort: Vec<SortSpec>,
    /// Fields to return (`None` = all).
    pub projection: Option<Vec<String>>,
    /// Rows to skip.
    pub skip: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

impl FindQuery {
    /// Unbounded query for a filter.
    pub fn new(filter: FilterExpr) -> Self {
        Self {
            filter,
            sort: vec![],
            projection: None,
            skip: 0,
            limit: u64::MAX,
        }
    }

    /// Set ordering.
    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    /// Set projection.
    pub fn with_projection(mut self, projection: Option<Vec<String>>) -> Self {
        self.projection = projection;
        self
    }

    /// Set skip and limit.
    pub fn with_window(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }
}

/// Relation expansion inside an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupStage {
    /// Related entity.
    pub from: String,
    /// Field on the current rows holding the reference.
    pub local_field: String,
    /// Field on the related entity matched against it.
    pub foreign_field: String,
    /// Output field on the current rows.
    pub as_field: String,
    /// Whether the relation yields many rows (array) or one (object).
    pub many: bool,
    /// Stages applied to related rows (scoping, projection, nested lookups).
    pub pipeline: Vec<PipelineStage>,
}

/// One aggregation pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    /// Keep rows matching the filter.
    Match(FilterExpr),
    /// Order rows.
    Sort(Vec<SortSpec>),
    /// Drop leading rows.
    Skip(u64),
    /// Keep leading rows.
    Limit(u64),
    /// Keep only the listed fields.
    Project(Vec<String>),
    /// Attach related rows.
    Lookup(LookupStage),
}
