//! In-memory datastore.
//!
//! Evaluates the compiled AST directly against JSON documents. Used by the
//! gateway's demo mode, the benches and the tests, which rely on its call
//! counter to prove that rejected or cached requests never reach the store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sieve_proto::{FilterExpr, FindQuery, LookupStage, PipelineStage};

use super::evaluate::{compare_documents, project, resolve, FilterMatcher};
use crate::error::StoreError;
use crate::query::{Document, QueryExecutor};

/// Collections of JSON documents keyed by entity name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    calls: AtomicU64,
    latency: Option<Duration>,
    offline: AtomicBool,
}

fn window(len: usize, skip: u64, limit: u64) -> (usize, usize) {
    let start = usize::try_from(skip).unwrap_or(usize::MAX).min(len);
    let take = usize::try_from(limit).unwrap_or(usize::MAX);
    (start, take)
}

fn filtered(rows: &[Document], filter: &FilterExpr) -> Result<Vec<Document>, StoreError> {
    let matcher = FilterMatcher::new(filter)?;
    Ok(rows.iter().filter(|doc| matcher.matches(doc)).cloned().collect())
}

fn flatten(values: Vec<&Document>) -> Vec<&Document> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Document::Array(items) => items.iter().collect(),
            Document::Null => vec![],
            other => vec![other],
        })
        .collect()
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed from `{"Entity": [documents...]}`.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let collections: HashMap<String, Vec<Document>> = serde_json::from_str(json)
            .map_err(|e| StoreError::Corrupt(format!("seed data: {}", e)))?;
        Ok(Self {
            collections: RwLock::new(collections),
            ..Self::default()
        })
    }

    /// Seed from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Add one document.
    pub fn insert(&self, entity: &str, doc: Document) {
        self.collections
            .write()
            .entry(entity.to_string())
            .or_default()
            .push(doc);
    }

    /// Add many documents.
    pub fn insert_many(&self, entity: &str, docs: impl IntoIterator<Item = Document>) {
        self.collections
            .write()
            .entry(entity.to_string())
            .or_default()
            .extend(docs);
    }

    /// Number of documents stored for an entity.
    pub fn len(&self, entity: &str) -> usize {
        self.collections.read().get(entity).map_or(0, Vec::len)
    }

    /// Check if no entity has documents.
    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(Vec::is_empty)
    }

    /// Datastore calls served so far (`find`, `aggregate` and `count`).
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Reset the call counter.
    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }

    /// Make every call fail as unavailable until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn snapshot(&self, entity: &str) -> Vec<Document> {
        self.collections.read().get(entity).cloned().unwrap_or_default()
    }

    fn run_pipeline(
        &self,
        mut rows: Vec<Document>,
        stages: &[PipelineStage],
    ) -> Result<Vec<Document>, StoreError> {
        for stage in stages {
            rows = match stage {
                PipelineStage::Match(filter) => filtered(&rows, filter)?,
                PipelineStage::Sort(sort) => {
                    rows.sort_by(|a, b| compare_documents(a, b, sort));
                    rows
                }
                PipelineStage::Skip(n) => {
                    let (start, _) = window(rows.len(), *n, 0);
                    rows.split_off(start)
                }
                PipelineStage::Limit(n) => {
                    let (_, take) = window(rows.len(), 0, *n);
                    rows.truncate(take);
                    rows
                }
                PipelineStage::Project(fields) => {
                    rows.iter().map(|doc| project(doc, fields)).collect()
                }
                PipelineStage::Lookup(lookup) => self.lookup(rows, lookup)?,
            };
        }
        Ok(rows)
    }

    fn lookup(
        &self,
        mut rows: Vec<Document>,
        lookup: &LookupStage,
    ) -> Result<Vec<Document>, StoreError> {
        let related = self.run_pipeline(self.snapshot(&lookup.from), &lookup.pipeline)?;
        for row in &mut rows {
            let local: Vec<Document> = flatten(resolve(row, &lookup.local_field))
                .into_iter()
                .cloned()
                .collect();
            let matches: Vec<Document> = related
                .iter()
                .filter(|r| {
                    flatten(resolve(r, &lookup.foreign_field))
                        .iter()
                        .any(|f| local.contains(*f))
                })
                .cloned()
                .collect();
            let attached = if lookup.many {
                Document::Array(matches)
            } else {
                matches.into_iter().next().unwrap_or(Document::Null)
            };
            if let Document::Object(map) = row {
                map.insert(lookup.as_field.clone(), attached);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for MemoryStore {
    async fn find(&self, entity: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        self.enter().await?;
        let mut rows = filtered(&self.snapshot(entity), &query.filter)?;
        rows.sort_by(|a, b| compare_documents(a, b, &query.sort));
        let (start, take) = window(rows.len(), query.skip, query.limit);
        let page = rows.into_iter().skip(start).take(take);
        Ok(match &query.projection {
            Some(fields) => page.map(|doc| project(&doc, fields)).collect(),
            None => page.collect(),
        })
    }

    async fn aggregate(
        &self,
        entity: &str,
        pipeline: &[PipelineStage],
    ) -> Result<Vec<Document>, StoreError> {
        self.enter().await?;
        self.run_pipeline(self.snapshot(entity), pipeline)
    }

    async fn count(&self, entity: &str, filter: &FilterExpr) -> Result<u64, StoreError> {
        self.enter().await?;
        let matcher = FilterMatcher::new(filter)?;
        let collections = self.collections.read();
        let count = collections
            .get(entity)
            .map_or(0, |rows| rows.iter().filter(|doc| matcher.matches(doc)).count());
        Ok(count as u64)
    }
}
