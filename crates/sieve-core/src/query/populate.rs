//! Relation expansion for `populate=customer,items.product`.
//!
//! Every related entity is scoped again: its own tenant constraint and
//! soft-delete exclusion are part of the plan, so populating can never reach
//! rows the caller could not list directly.

use std::future::Future;
use std::pin::Pin;

use sieve_proto::{
    Constraint, FilterExpr, FindQuery, LookupStage, Match, PipelineStage, PopulateSummary,
};

use super::coerce::coerce_json;
use super::executor::QueryExecutor;
use super::filter::validate_field_path;
use super::json_path;
use super::spec::QuerySpec;
use crate::catalog::{Catalog, EntityDescriptor, FieldTypeProvider, RelationDef};
use crate::config::EngineConfig;
use crate::error::{Error, Result, StoreError};
use crate::security::{relation_scope, SecurityContext};

/// Plan for one relation expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatePlan {
    /// Dotted path from the root entity.
    pub path: String,
    /// Nesting depth (1 for top level).
    pub depth: usize,
    /// Relation followed.
    pub relation: RelationDef,
    /// Related entity.
    pub target_entity: String,
    /// Tenant and soft-delete scope for related rows.
    pub filter: FilterExpr,
    /// Fields kept on related rows (`None` = all).
    pub projection: Option<Vec<String>>,
    /// Nested expansions on the related rows.
    pub children: Vec<PopulatePlan>,
}

impl PopulatePlan {
    /// Flattened summaries of this plan and its children.
    pub fn summaries(&self) -> Vec<PopulateSummary> {
        let mut out = vec![PopulateSummary {
            path: self.path.clone(),
            target_entity: self.target_entity.clone(),
            depth: self.depth as u32,
            filter: self.filter.to_string(),
        }];
        for child in &self.children {
            out.extend(child.summaries());
        }
        out
    }

    /// Paths of this plan and its children.
    pub fn paths(&self) -> Vec<String> {
        self.summaries().into_iter().map(|s| s.path).collect()
    }

    /// Aggregation lookup stage for this plan.
    pub fn lookup_stage(&self) -> LookupStage {
        let mut pipeline = vec![PipelineStage::Match(self.filter.clone())];
        pipeline.extend(
            self.children
                .iter()
                .map(|child| PipelineStage::Lookup(child.lookup_stage())),
        );
        if let Some(fields) = &self.projection {
            pipeline.push(PipelineStage::Project(fields.clone()));
        }
        LookupStage {
            from: self.target_entity.clone(),
            local_field: self.relation.local_field.clone(),
            foreign_field: self.relation.foreign_field.clone(),
            as_field: self.relation.name.clone(),
            many: self.relation.is_many(),
            pipeline,
        }
    }
}

/// Builds population plans against a catalog.
pub struct PopulateResolver<'a> {
    catalog: &'a Catalog,
    ctx: &'a SecurityContext,
    max_depth: usize,
}

impl<'a> PopulateResolver<'a> {
    /// Create a resolver.
    pub fn new(catalog: &'a Catalog, ctx: &'a SecurityContext, config: &EngineConfig) -> Self {
        Self {
            catalog,
            ctx,
            max_depth: config.max_populate_depth,
        }
    }

    /// Resolve the `populate` parameter for `entity`.
    pub fn resolve(
        &self,
        spec: &QuerySpec,
        entity: &EntityDescriptor,
    ) -> Result<Vec<PopulatePlan>> {
        let Some(raw) = spec.get("populate") else {
            return Ok(vec![]);
        };

        let mut plans = Vec::new();
        for path in raw
            .values()
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            validate_field_path(path)?;
            let segments: Vec<&str> = path.split('.').collect();
            if segments.len() > self.max_depth {
                return Err(Error::validation(format!(
                    "populate path '{}' is deeper than {}",
                    path, self.max_depth
                )));
            }
            self.insert(&mut plans, entity, &segments, "", 1)?;
        }

        for plan in &mut plans {
            self.finalize(plan)?;
        }
        Ok(plans)
    }

    fn insert(
        &self,
        plans: &mut Vec<PopulatePlan>,
        entity: &EntityDescriptor,
        segments: &[&str],
        prefix: &str,
        depth: usize,
    ) -> Result<()> {
        let Some((&name, rest)) = segments.split_first() else {
            return Ok(());
        };
        let relation = entity.get_relation(name).ok_or_else(|| {
            Error::validation(format!("{} has no relation '{}'", entity.name, name))
        })?;
        let target = self.target(relation)?;

        let index = match plans.iter().position(|p| p.relation.name == name) {
            Some(index) => index,
            None => {
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}.{}", prefix, name)
                };
                plans.push(PopulatePlan {
                    path,
                    depth,
                    relation: relation.clone(),
                    target_entity: target.name.clone(),
                    filter: relation_scope(target, self.ctx).into(),
                    projection: None,
                    children: vec![],
                });
                plans.len() - 1
            }
        };

        let plan = &mut plans[index];
        let prefix = plan.path.clone();
        self.insert(&mut plan.children, target, rest, &prefix, depth + 1)
    }

    fn target(&self, relation: &RelationDef) -> Result<&'a EntityDescriptor> {
        self.catalog.get(&relation.target_entity).ok_or_else(|| {
            Error::validation(format!(
                "relation '{}' targets unknown entity '{}'",
                relation.name, relation.target_entity
            ))
        })
    }

    /// Restrict related rows to the target's selectable fields, keeping
    /// whatever the joins need.
    fn finalize(&self, plan: &mut PopulatePlan) -> Result<()> {
        for child in &mut plan.children {
            self.finalize(child)?;
        }
        let target = self.target(&plan.relation)?;
        let Some(selectable) = &target.selectable_fields else {
            return Ok(());
        };

        let mut fields = vec![target.id_field.clone(), plan.relation.foreign_field.clone()];
        fields.extend(selectable.iter().cloned());
        for child in &plan.children {
            fields.push(child.relation.local_field.clone());
            fields.push(child.relation.name.clone());
        }
        let mut seen = std::collections::BTreeSet::new();
        fields.retain(|f| seen.insert(f.clone()));
        plan.projection = Some(fields);
        Ok(())
    }
}

fn flatten(value: &serde_json::Value) -> Vec<&serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.iter().flat_map(flatten).collect(),
        serde_json::Value::Null => vec![],
        other => vec![other],
    }
}

fn linked(local: &serde_json::Value, foreign: Option<&serde_json::Value>) -> bool {
    let Some(foreign) = foreign else {
        return false;
    };
    let foreign = flatten(foreign);
    flatten(local).iter().any(|l| foreign.contains(l))
}

/// Expand relations on fetched rows with one batched `find` per relation.
pub fn populate_rows<'a>(
    executor: &'a dyn QueryExecutor,
    types: &'a dyn FieldTypeProvider,
    rows: &'a mut [serde_json::Value],
    plans: &'a [PopulatePlan],
) -> Pin<Box<dyn Future<Output = std::result::Result<(), StoreError>> + Send + 'a>> {
    Box::pin(async move {
        for plan in plans {
            let relation = &plan.relation;
            let hint = types.field_type(&plan.target_entity, &relation.foreign_field);

            let mut keys = Vec::new();
            for row in rows.iter() {
                if let Some(local) = json_path(row, &relation.local_field) {
                    for key in flatten(local) {
                        for value in coerce_json(key, hint) {
                            if !keys.contains(&value) {
                                keys.push(value);
                            }
                        }
                    }
                }
            }

            let mut related = if keys.is_empty() {
                vec![]
            } else {
                let filter = FilterExpr::and([
                    Match::single(relation.foreign_field.as_str(), Constraint::in_values(keys))
                        .into(),
                    plan.filter.clone(),
                ]);
                let query = FindQuery::new(filter).with_projection(plan.projection.clone());
                executor.find(&plan.target_entity, &query).await?
            };
            populate_rows(executor, types, &mut related, &plan.children).await?;

            for row in rows.iter_mut() {
                let local = json_path(row, &relation.local_field).cloned();
                let matches: Vec<serde_json::Value> = match &local {
                    Some(local) => related
                        .iter()
                        .filter(|r| linked(local, json_path(r, &relation.foreign_field)))
                        .cloned()
                        .collect(),
                    None => vec![],
                };
                let attached = if relation.is_many() {
                    serde_json::Value::Array(matches)
                } else {
                    matches.into_iter().next().unwrap_or(serde_json::Value::Null)
                };
                if let serde_json::Value::Object(map) = row {
                    map.insert(relation.name.clone(), attached);
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityDescriptor::new("Invoice")
                    .with_tenant_field("tenantId")
                    .with_relation(RelationDef::one("customer", "customerId", "Customer", "_id"))
                    .with_relation(RelationDef::many("lines", "_id", "InvoiceLine", "invoiceId")),
            )
            .with_entity(
                EntityDescriptor::new("Customer")
                    .with_tenant_field("tenantId")
                    .with_soft_delete("isDeleted")
                    .with_selectable(["name"]),
            )
            .with_entity(
                EntityDescriptor::new("InvoiceLine")
                    .with_tenant_field("tenantId")
                    .with_field(FieldDef::reference("invoiceId"))
                    .with_relation(RelationDef::one("product", "productId", "Product", "_id")),
            )
            .with_entity(EntityDescriptor::new("Product").with_tenant_field("tenantId"))
    }

    fn resolve(populate: &str, depth: usize) -> Result<Vec<PopulatePlan>> {
        let catalog = catalog();
        let ctx = SecurityContext::for_tenant("t1");
        let config = EngineConfig::default().with_max_populate_depth(depth);
        let spec = QuerySpec::new().with("populate", populate);
        let invoice = catalog.require("Invoice").unwrap().clone();
        PopulateResolver::new(&catalog, &ctx, &config).resolve(&spec, &invoice)
    }

    #[test]
    fn test_plans_are_tenant_scoped() {
        let plans = resolve("customer", 3).unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.target_entity, "Customer");
        assert_eq!(
            plan.filter,
            FilterExpr::Match(
                Match::new()
                    .with("tenantId", Constraint::eq("t1"))
                    .with("isDeleted", Constraint::ne(true))
            )
        );
        assert_eq!(
            plan.projection,
            Some(vec!["_id".to_string(), "name".to_string()])
        );
    }

    #[test]
    fn test_nested_paths_merge() {
        let plans = resolve("lines,lines.product", 3).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].children.len(), 1);
        assert_eq!(plans[0].children[0].path, "lines.product");
        assert_eq!(plans[0].children[0].depth, 2);
        assert_eq!(plans[0].paths(), vec!["lines", "lines.product"]);
    }

    #[test]
    fn test_unknown_relation_rejected() {
        assert!(resolve("vendor", 3).unwrap_err().is_validation());
        assert!(resolve("customer.orders", 3).unwrap_err().is_validation());
    }

    #[test]
    fn test_depth_cap() {
        assert!(resolve("lines.product", 1).unwrap_err().is_validation());
        assert!(resolve("lines.product", 2).is_ok());
    }

    #[test]
    fn test_lookup_stage() {
        let plans = resolve("lines.product", 3).unwrap();
        let stage = plans[0].lookup_stage();
        assert_eq!(stage.from, "InvoiceLine");
        assert!(stage.many);
        assert_eq!(stage.pipeline.len(), 2);
        assert!(matches!(
            stage.pipeline[1],
            PipelineStage::Lookup(ref l) if l.as_field == "product"
        ));
    }
}
