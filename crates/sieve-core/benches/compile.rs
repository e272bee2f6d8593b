//! Query compilation and in-memory evaluation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use sieve_core::store::FilterMatcher;
use sieve_core::{
    Catalog, EngineConfig, EntityDescriptor, FieldDef, QueryBuilder, QueryOptions, QuerySpec,
    RelationDef, SecurityContext,
};

fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntityDescriptor::new("Order")
                .with_tenant_field("tenantId")
                .with_soft_delete("isDeleted")
                .with_fields([
                    FieldDef::string("status"),
                    FieldDef::number("total"),
                    FieldDef::date("createdAt"),
                    FieldDef::reference("customerId"),
                ])
                .with_sortable(["total", "createdAt"])
                .with_search_fields(["status"])
                .with_relation(RelationDef::one("customer", "customerId", "Customer", "_id")),
        )
        .with_entity(EntityDescriptor::new("Customer").with_tenant_field("tenantId"))
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/build");

    let catalog = catalog();
    let config = EngineConfig::default();
    let options = QueryOptions::default();
    let ctx = SecurityContext::for_tenant("t1");
    let entity = catalog.get("Order").unwrap();

    let cases = [
        ("empty", QuerySpec::new()),
        (
            "filters",
            QuerySpec::from_pairs([
                ("status", "open"),
                ("total[gte]", "100"),
                ("createdAt[lt]", "2024-01-01"),
            ]),
        ),
        (
            "full",
            QuerySpec::from_pairs([
                ("status[in]", "open,paid"),
                ("search", "ope"),
                ("sort", "-total,createdAt"),
                ("fields", "status,total"),
                ("populate", "customer"),
                ("page", "3"),
                ("limit", "25"),
            ]),
        ),
    ];

    for (name, spec) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &spec, |b, spec| {
            b.iter(|| {
                let builder = QueryBuilder::new(entity, &catalog, &ctx, &options, &config);
                black_box(builder.build(spec).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/match");

    let catalog = catalog();
    let config = EngineConfig::default();
    let options = QueryOptions::default();
    let ctx = SecurityContext::for_tenant("t1");
    let entity = catalog.get("Order").unwrap();
    let spec = QuerySpec::from_pairs([("status", "open"), ("total[gte]", "500")]);
    let (query, _) = QueryBuilder::new(entity, &catalog, &ctx, &options, &config)
        .build(&spec)
        .unwrap();
    let matcher = FilterMatcher::new(&query.filter).unwrap();

    let docs: Vec<_> = (0..1000)
        .map(|i| {
            json!({
                "_id": format!("{:024x}", i),
                "tenantId": if i % 4 == 0 { "t2" } else { "t1" },
                "status": if i % 2 == 0 { "open" } else { "paid" },
                "total": i,
            })
        })
        .collect();

    group.bench_function("scan_1000", |b| {
        b.iter(|| black_box(docs.iter().filter(|d| matcher.matches(d)).count()));
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_match);
criterion_main!(benches);
