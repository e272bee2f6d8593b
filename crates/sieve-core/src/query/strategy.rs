//! Find and aggregate execution strategies.
//!
//! A strategy is picked once per request, when the builder is constructed;
//! nothing downstream branches on the execution path again.

use async_trait::async_trait;
use sieve_proto::{ExecutionPath, PipelineStage};

use super::builder::CompiledQuery;
use super::executor::{Document, QueryExecutor};
use super::populate::populate_rows;
use crate::catalog::FieldTypeProvider;
use crate::error::StoreError;

/// One way of fetching a compiled query's rows.
#[async_trait]
pub trait QueryStrategy: Send + Sync {
    /// Path this strategy implements.
    fn path(&self) -> ExecutionPath;

    /// Pipeline the strategy would run, if it runs one.
    fn pipeline(&self, query: &CompiledQuery) -> Option<Vec<PipelineStage>>;

    /// Fetch the page window, relations included.
    async fn fetch(
        &self,
        executor: &dyn QueryExecutor,
        types: &dyn FieldTypeProvider,
        query: &CompiledQuery,
    ) -> Result<Vec<Document>, StoreError>;
}

/// Plain `find`, then one batched `find` per populated relation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindStrategy;

#[async_trait]
impl QueryStrategy for FindStrategy {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Find
    }

    fn pipeline(&self, _query: &CompiledQuery) -> Option<Vec<PipelineStage>> {
        None
    }

    async fn fetch(
        &self,
        executor: &dyn QueryExecutor,
        types: &dyn FieldTypeProvider,
        query: &CompiledQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let mut rows = executor.find(&query.entity, &query.find_query()).await?;
        if !query.populate.is_empty() {
            populate_rows(executor, types, &mut rows, &query.populate).await?;
        }
        Ok(rows)
    }
}

/// Single aggregation pipeline with relations as lookup stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateStrategy;

#[async_trait]
impl QueryStrategy for AggregateStrategy {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Aggregate
    }

    fn pipeline(&self, query: &CompiledQuery) -> Option<Vec<PipelineStage>> {
        let mut stages = vec![
            PipelineStage::Match(query.filter.clone()),
            PipelineStage::Sort(query.sort.clone()),
        ];
        if query.skip > 0 {
            stages.push(PipelineStage::Skip(query.skip));
        }
        stages.push(PipelineStage::Limit(query.fetch_limit));
        stages.extend(
            query
                .populate
                .iter()
                .map(|plan| PipelineStage::Lookup(plan.lookup_stage())),
        );
        if let Some(fields) = &query.projection {
            stages.push(PipelineStage::Project(fields.clone()));
        }
        Some(stages)
    }

    async fn fetch(
        &self,
        executor: &dyn QueryExecutor,
        _types: &dyn FieldTypeProvider,
        query: &CompiledQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let pipeline = self.pipeline(query).unwrap_or_default();
        executor.aggregate(&query.entity, &pipeline).await
    }
}

static FIND: FindStrategy = FindStrategy;
static AGGREGATE: AggregateStrategy = AggregateStrategy;

/// Strategy implementing `path`.
pub fn strategy_for(path: ExecutionPath) -> &'static dyn QueryStrategy {
    match path {
        ExecutionPath::Find => &FIND,
        ExecutionPath::Aggregate => &AGGREGATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for() {
        assert_eq!(strategy_for(ExecutionPath::Find).path(), ExecutionPath::Find);
        assert_eq!(strategy_for(ExecutionPath::Aggregate).path(), ExecutionPath::Aggregate);
    }
}
