//! HTTP surface tests.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use sieve_core::{
    Catalog, EngineConfig, EntityDescriptor, FieldDef, MemoryCacheStore, MemoryStore, QueryEngine,
};
use sieve_gateway::{create_router, AppState, GatewayConfig};

const TENANT: HeaderName = HeaderName::from_static("x-tenant-id");
const ACTOR: HeaderName = HeaderName::from_static("x-actor-id");

fn server() -> TestServer {
    let catalog = Catalog::new()
        .with_entity(
            EntityDescriptor::new("Product")
                .with_tenant_field("tenantId")
                .with_soft_delete("isDeleted")
                .with_fields([FieldDef::string("name"), FieldDef::number("price")])
                .with_sortable(["price"])
                .with_search_fields(["name"]),
        )
        .with_entity(EntityDescriptor::new("Country").with_field(FieldDef::string("code")));

    let store = MemoryStore::new();
    store.insert_many(
        "Product",
        (1..=12).map(|i| {
            json!({
                "_id": format!("{:024x}", i),
                "tenantId": if i <= 10 { "acme" } else { "globex" },
                "name": format!("Widget {}", i),
                "price": i * 5,
            })
        }),
    );
    store.insert_many("Country", vec![json!({"_id": "c1", "code": "NZ"})]);

    let engine = QueryEngine::new(Arc::new(store), catalog, EngineConfig::default())
        .with_cache(Arc::new(MemoryCacheStore::new()));
    let app = create_router(AppState::new(engine, GatewayConfig::default()));
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Json = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["entities"], json!(["Country", "Product"]));
}

#[tokio::test]
async fn test_list_scoped_to_tenant_header() {
    let server = server();
    let response = server
        .get("/api/Product")
        .add_header(TENANT, HeaderValue::from_static("acme"))
        .add_header(ACTOR, HeaderValue::from_static("u1"))
        .add_query_param("sort", "-price")
        .add_query_param("limit", "3")
        .await;
    response.assert_status_ok();

    let body: Json = response.json();
    let prices: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["price"].as_i64().unwrap())
        .collect();
    assert_eq!(prices, vec![50, 45, 40]);
    assert_eq!(body["pagination"]["total"], 10);
    assert_eq!(body["pagination"]["pages"], 4);
    assert_eq!(body["performance"]["from_cache"], false);
}

#[tokio::test]
async fn test_repeated_keys_become_in() {
    let server = server();
    let response = server
        .get("/api/Product?name=Widget%201&name=Widget%202&name=Widget%2011")
        .add_header(TENANT, HeaderValue::from_static("acme"))
        .await;
    response.assert_status_ok();

    let body: Json = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_validation_error_is_400() {
    let server = server();
    let response = server
        .get("/api/Product")
        .add_header(TENANT, HeaderValue::from_static("acme"))
        .add_query_param("price[bogus]", "1")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Json = response.json();
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let metrics = server.get("/metrics").await.text();
    assert!(metrics.contains("sieve_validation_failures_total 1"));
}

#[tokio::test]
async fn test_unknown_entity_is_404() {
    let server = server();
    let response = server
        .get("/api/Nope")
        .add_header(TENANT, HeaderValue::from_static("acme"))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Json>()["code"], "UNKNOWN_ENTITY");
}

#[tokio::test]
async fn test_tenant_header_required_for_scoped_entity() {
    let server = server();
    let response = server.get("/api/Product").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Json>()["code"], "BAD_REQUEST");

    // Unscoped entities need no tenant.
    server.get("/api/Country").await.assert_status_ok();
}

#[tokio::test]
async fn test_second_request_served_from_cache() {
    let server = server();
    for expected in [false, true] {
        let body: Json = server
            .get("/api/Product")
            .add_header(TENANT, HeaderValue::from_static("globex"))
            .await
            .json();
        assert_eq!(body["performance"]["from_cache"], expected);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    let metrics = server.get("/metrics").await.text();
    assert!(metrics.contains("sieve_cache_hits_total 1"));
    assert!(metrics.contains("sieve_entity_queries_total{entity=\"Product\"} 2"));
}

#[tokio::test]
async fn test_explain() {
    let server = server();
    let response = server
        .get("/api/Product/explain")
        .add_header(TENANT, HeaderValue::from_static("acme"))
        .add_query_param("search", "widget")
        .await;
    response.assert_status_ok();

    let body: Json = response.json();
    assert_eq!(body["cached"], false);
    assert!(body["explanation"]
        .as_str()
        .unwrap()
        .contains("Query Plan for Product"));
}
