//! Compilation of `search=` into an OR group over searchable fields.

use serde::{Deserialize, Serialize};
use sieve_proto::{Constraint, FilterExpr, Match};

/// How a search term is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Case-insensitive substring match on any field.
    #[default]
    Regex,
    /// Case-insensitive prefix match on any field.
    Autocomplete,
    /// Full-text search. Compiled as [`SearchStrategy::Regex`] until a
    /// datastore with a text index is wired in.
    Text,
}

/// Prepare a raw term: trim, truncate to `max_len` characters, escape.
///
/// Returns `None` for a blank term.
pub fn normalize_term(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let truncated: String = trimmed.chars().take(max_len).collect();
    Some(regex::escape(&truncated))
}

/// Builds search filters.
pub struct SearchCompiler;

impl SearchCompiler {
    /// Compile a term against `fields`.
    ///
    /// Returns `None` when the term is blank or there is nothing to search.
    pub fn compile(
        term: &str,
        fields: &[String],
        strategy: SearchStrategy,
        max_len: usize,
    ) -> Option<FilterExpr> {
        if fields.is_empty() {
            return None;
        }
        let escaped = normalize_term(term, max_len)?;
        let pattern = match strategy {
            SearchStrategy::Regex => escaped,
            SearchStrategy::Autocomplete => format!("^{}", escaped),
            SearchStrategy::Text => {
                tracing::debug!("text search has no index; using regex match");
                escaped
            }
        };
        Some(FilterExpr::Or(
            fields
                .iter()
                .map(|field| {
                    Match::single(field.as_str(), Constraint::regex(pattern.clone(), true))
                })
                .collect(),
        ))
    }
}
