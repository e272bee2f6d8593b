//! Per-request query compilation.

use std::time::Instant;

use serde_json::json;
use sieve_proto::{
    ExecutionPath, ExecutionTrace, FilterExpr, FindQuery, PaginationState, QueryMetadata,
    SortSpec,
};

use super::cache::{CacheKeyParts, QueryCache};
use super::filter::FilterCompiler;
use super::options::QueryOptions;
use super::pagination::{self, PaginationPlan};
use super::populate::{PopulatePlan, PopulateResolver};
use super::sanitize::sanitize;
use super::search::SearchCompiler;
use super::sort::{compile_select, compile_sort};
use super::spec::QuerySpec;
use super::strategy::{strategy_for, QueryStrategy};
use crate::catalog::{Catalog, EntityDescriptor};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::security::SecurityContext;

/// Everything the executor needs for one request.
///
/// Produced once by [`QueryBuilder::build`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Entity listed.
    pub entity: String,
    /// Sanitized parameters.
    pub spec: QuerySpec,
    /// Filter from parameters plus tenant and soft-delete scoping.
    pub base_filter: FilterExpr,
    /// Base filter AND search AND cursor constraint.
    pub filter: FilterExpr,
    /// Search term, as received.
    pub search: Option<String>,
    /// Effective ordering.
    pub sort: Vec<SortSpec>,
    /// Fields fetched (`None` = all).
    pub projection: Option<Vec<String>>,
    /// Page window.
    pub pagination: PaginationState,
    /// Rows skipped.
    pub skip: u64,
    /// Rows fetched.
    pub fetch_limit: u64,
    /// Relation expansions.
    pub populate: Vec<PopulatePlan>,
    /// Execution path.
    pub path: ExecutionPath,
    /// Caller's tenant, part of the cache key.
    pub tenant: Option<String>,
}

impl CompiledQuery {
    /// `find` request for the page window.
    pub fn find_query(&self) -> FindQuery {
        FindQuery::new(self.filter.clone())
            .with_sort(self.sort.clone())
            .with_projection(self.projection.clone())
            .with_window(self.skip, self.fetch_limit)
    }

    /// Dotted paths of every populated relation.
    pub fn populate_paths(&self) -> Vec<String> {
        self.populate.iter().flat_map(PopulatePlan::paths).collect()
    }

    /// Cache key for this query.
    pub fn cache_key(&self) -> Result<String> {
        QueryCache::key_for(CacheKeyParts {
            entity: &self.entity,
            spec: &self.spec,
            filter: &self.filter,
            tenant: self.tenant.as_deref(),
            pagination: &self.pagination,
            path: self.path,
        })
    }

    /// Response metadata for `count` returned rows.
    pub fn metadata(&self, count: usize) -> QueryMetadata {
        QueryMetadata {
            entity: self.entity.clone(),
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            search: self.search.clone(),
            populate: self.populate_paths(),
            execution_path: self.path,
            count,
        }
    }
}

/// Compiles one request.
///
/// Owns the execution trace; each stage times itself into it.
pub struct QueryBuilder<'a> {
    entity: &'a EntityDescriptor,
    catalog: &'a Catalog,
    ctx: &'a SecurityContext,
    options: &'a QueryOptions,
    config: &'a EngineConfig,
    strategy: &'static dyn QueryStrategy,
    trace: ExecutionTrace,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder; picks the execution strategy.
    pub fn new(
        entity: &'a EntityDescriptor,
        catalog: &'a Catalog,
        ctx: &'a SecurityContext,
        options: &'a QueryOptions,
        config: &'a EngineConfig,
    ) -> Self {
        let path = options.execution_path.unwrap_or(config.execution_path);
        Self {
            entity,
            catalog,
            ctx,
            options,
            config,
            strategy: strategy_for(path),
            trace: ExecutionTrace::new(),
        }
    }

    /// Strategy chosen for this request.
    pub fn strategy(&self) -> &'static dyn QueryStrategy {
        self.strategy
    }

    fn stage<T>(
        &mut self,
        name: &str,
        run: impl FnOnce() -> Result<T>,
        describe: impl FnOnce(&T) -> serde_json::Value,
    ) -> Result<T> {
        let started = Instant::now();
        let out = run()?;
        let elapsed = started.elapsed();
        let extra = describe(&out);
        tracing::debug!(
            entity = %self.entity.name,
            stage = name,
            elapsed_us = elapsed.as_micros() as u64,
            "query stage"
        );
        self.trace.record(name, elapsed, extra);
        Ok(out)
    }

    /// Run every compilation stage over a raw spec.
    ///
    /// Fails with a validation error before anything touches the datastore.
    pub fn build(mut self, raw: &QuerySpec) -> Result<(CompiledQuery, ExecutionTrace)> {
        let entity = self.entity;
        let catalog = self.catalog;
        let ctx = self.ctx;
        let options = self.options;
        let config = self.config;

        let spec = self.stage(
            "sanitize",
            || Ok(sanitize(raw)),
            |clean: &QuerySpec| json!({ "dropped": raw.len().saturating_sub(clean.len()) }),
        )?;

        let base_filter = self.stage(
            "filter",
            || FilterCompiler::new(entity, catalog, config).compile(&spec, ctx, options),
            |f: &FilterExpr| json!({ "fields": f.fields().len() }),
        )?;

        let search = spec.get_str("search").map(str::to_string);
        let search_filter = self.stage(
            "search",
            || {
                let fields = options
                    .search_fields
                    .as_deref()
                    .unwrap_or(&entity.search_fields);
                Ok(search.as_deref().and_then(|term| {
                    SearchCompiler::compile(
                        term,
                        fields,
                        options.search_strategy,
                        config.max_search_length,
                    )
                }))
            },
            |f: &Option<FilterExpr>| json!({ "applied": f.is_some() }),
        )?;

        let sort = self.stage(
            "sort",
            || compile_sort(&spec, entity),
            |s: &Vec<SortSpec>| json!({ "keys": s.len() }),
        )?;
        let selected = self.stage(
            "select",
            || Ok(compile_select(&spec, entity)),
            |p: &Option<Vec<String>>| json!({ "fields": p.as_ref().map(Vec::len) }),
        )?;

        let PaginationPlan {
            state,
            sort,
            constraint,
            cursor_field,
            skip,
            fetch_limit,
        } = self.stage(
            "pagination",
            || pagination::resolve(&spec, options.pagination, sort, entity, catalog, config),
            |p: &PaginationPlan| json!({ "cursor": p.state.is_cursor(), "limit": p.state.limit() }),
        )?;

        let populate = self.stage(
            "populate",
            || PopulateResolver::new(catalog, ctx, config).resolve(&spec, entity),
            |plans: &Vec<PopulatePlan>| json!({ "relations": plans.len() }),
        )?;

        let projection = selected.map(|mut fields| {
            let mut extra: Vec<String> = cursor_field.into_iter().collect();
            for plan in &populate {
                extra.push(plan.relation.local_field.clone());
                extra.push(plan.relation.name.clone());
            }
            for field in extra {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
            fields
        });

        let mut parts = vec![base_filter.clone()];
        parts.extend(search_filter);
        parts.extend(constraint);
        let filter = FilterExpr::and(parts);

        let compiled = CompiledQuery {
            entity: entity.name.clone(),
            spec,
            base_filter,
            filter,
            search,
            sort,
            projection,
            pagination: state,
            skip,
            fetch_limit,
            populate,
            path: self.strategy.path(),
            tenant: ctx.tenant_id.clone(),
        };
        Ok((compiled, self.trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, RelationDef};
    use crate::query::PaginationStrategy;
    use pretty_assertions::assert_eq;
    use sieve_proto::{Constraint, Match, Operator};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityDescriptor::new("Product")
                    .with_tenant_field("tenantId")
                    .with_soft_delete("isDeleted")
                    .with_fields([FieldDef::string("name"), FieldDef::number("price")])
                    .with_search_fields(["name", "sku"])
                    .with_sortable(["name", "price"])
                    .with_selectable(["name", "price"])
                    .with_relation(RelationDef::one("vendor", "vendorId", "Vendor", "_id")),
            )
            .with_entity(EntityDescriptor::new("Vendor").with_tenant_field("tenantId"))
    }

    fn build(pairs: &[(&str, &str)], options: &QueryOptions) -> Result<CompiledQuery> {
        let catalog = catalog();
        let entity = catalog.require("Product").unwrap().clone();
        let ctx = SecurityContext::for_tenant("t1");
        let config = EngineConfig::default();
        let spec = QuerySpec::from_pairs(pairs.iter().copied());
        QueryBuilder::new(&entity, &catalog, &ctx, options, &config)
            .build(&spec)
            .map(|(compiled, _)| compiled)
    }

    #[test]
    fn test_trace_records_every_stage() {
        let catalog = catalog();
        let entity = catalog.require("Product").unwrap().clone();
        let ctx = SecurityContext::for_tenant("t1");
        let options = QueryOptions::default();
        let config = EngineConfig::default();
        let (_, trace) = QueryBuilder::new(&entity, &catalog, &ctx, &options, &config)
            .build(&QuerySpec::new())
            .unwrap();
        assert_eq!(
            trace.stage_names(),
            vec!["sanitize", "filter", "search", "sort", "select", "pagination", "populate"]
        );
    }

    #[test]
    fn test_search_is_anded_with_base() {
        let compiled = build(&[("search", "bolt"), ("price[gt]", "5")], &QueryOptions::default())
            .unwrap();
        let FilterExpr::And(parts) = &compiled.filter else {
            panic!("expected a conjunction");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[1],
            FilterExpr::Or(vec![
                Match::single("name", Constraint::regex("bolt", true)),
                Match::single("sku", Constraint::regex("bolt", true)),
            ])
        );
        assert_eq!(compiled.search.as_deref(), Some("bolt"));
    }

    #[test]
    fn test_offset_window() {
        let compiled = build(&[("page", "3"), ("limit", "10")], &QueryOptions::default()).unwrap();
        assert_eq!(compiled.skip, 20);
        assert_eq!(compiled.fetch_limit, 10);
        let find = compiled.find_query();
        assert_eq!(find.skip, 20);
        assert_eq!(find.limit, 10);
        assert_eq!(find.sort, vec![SortSpec::desc("_id")]);
    }

    #[test]
    fn test_cursor_constraint_and_projection() {
        let options = QueryOptions::new().with_pagination(PaginationStrategy::Cursor);
        let compiled = build(
            &[
                ("cursor", "p9"),
                ("lastId", "65a1b2c3d4e5f60718293a4b"),
                ("cursorField", "name"),
                ("sort", "name"),
                ("fields", "price"),
            ],
            &options,
        )
        .unwrap();
        assert!(compiled.filter.operators().contains(&Operator::Gt));
        assert_eq!(
            compiled.projection,
            Some(vec!["_id".to_string(), "price".to_string(), "name".to_string()])
        );
        assert_eq!(compiled.fetch_limit, 21);
    }

    #[test]
    fn test_populate_fields_are_fetched() {
        let compiled =
            build(&[("populate", "vendor"), ("fields", "name")], &QueryOptions::default()).unwrap();
        assert_eq!(compiled.populate_paths(), vec!["vendor".to_string()]);
        assert_eq!(
            compiled.projection,
            Some(vec![
                "_id".to_string(),
                "name".to_string(),
                "vendorId".to_string(),
                "vendor".to_string(),
            ])
        );
    }

    #[test]
    fn test_execution_path_override() {
        let options = QueryOptions::new().with_execution_path(ExecutionPath::Aggregate);
        let compiled = build(&[], &options).unwrap();
        assert_eq!(compiled.path, ExecutionPath::Aggregate);
    }

    #[test]
    fn test_validation_fails_fast() {
        assert!(build(&[("limit", "0")], &QueryOptions::default())
            .unwrap_err()
            .is_validation());
        assert!(build(&[("sort", "secret")], &QueryOptions::default())
            .unwrap_err()
            .is_validation());
        assert!(build(&[("populate", "nope")], &QueryOptions::default())
            .unwrap_err()
            .is_validation());
    }
}
