use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_cell::services::catalog::{ProductCatalogService, ProductLookup};
use catalog_cell::CatalogError;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockBackendRows, TestConfig};

fn catalog_for(mock_server: &MockServer) -> ProductCatalogService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    ProductCatalogService::new(Arc::new(SupabaseClient::new(&config)))
}

async fn mount_category(mock_server: &MockServer, category_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/categories"))
        .and(query_param("id", format!("eq.{}", category_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockBackendRows::category_row(category_id, "Weight Management")
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn recommendations_return_active_products_in_display_order() {
    let mock_server = MockServer::start().await;
    mount_category(&mock_server, "weight-mgmt").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .and(query_param("category_id", "eq.weight-mgmt"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockBackendRows::product_row("prod-42", "weight-mgmt", "Semaglutide"),
            MockBackendRows::product_row("prod-43", "weight-mgmt", "Liraglutide"),
        ])))
        .mount(&mock_server)
        .await;

    let catalog = catalog_for(&mock_server);
    let products = catalog
        .get_product_recommendations("weight-mgmt")
        .await
        .expect("recommendations should succeed");

    assert_eq!(products.len(), 2);
    assert_eq!(products[0].id, "prod-42");
    assert!(products.iter().all(|p| p.is_active));
}

#[tokio::test]
async fn unknown_category_is_category_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let catalog = catalog_for(&mock_server);
    let result = catalog.get_product_recommendations("no-such-category").await;

    assert_matches!(result, Err(CatalogError::CategoryNotFound(id)) if id == "no-such-category");
}

#[tokio::test]
async fn verify_selection_returns_product_and_duration() {
    let mock_server = MockServer::start().await;
    mount_category(&mock_server, "weight-mgmt").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .and(query_param("id", "eq.prod-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockBackendRows::product_row("prod-42", "weight-mgmt", "Semaglutide")
        ])))
        .mount(&mock_server)
        .await;

    let catalog = catalog_for(&mock_server);
    let selection = catalog
        .verify_product_selection("weight-mgmt", "prod-42", "dur-monthly")
        .await
        .expect("selection should verify");

    assert_eq!(selection.product.id, "prod-42");
    assert_eq!(selection.duration.id, "dur-monthly");
    assert_eq!(selection.amount_cents(), 4900);
}

#[tokio::test]
async fn unknown_duration_is_rejected() {
    let mock_server = MockServer::start().await;
    mount_category(&mock_server, "weight-mgmt").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockBackendRows::product_row("prod-42", "weight-mgmt", "Semaglutide")
        ])))
        .mount(&mock_server)
        .await;

    let catalog = catalog_for(&mock_server);
    let result = catalog
        .verify_product_selection("weight-mgmt", "prod-42", "dur-weekly")
        .await;

    assert_matches!(
        result,
        Err(CatalogError::DurationNotAvailable { duration_id, .. }) if duration_id == "dur-weekly"
    );
}

#[tokio::test]
async fn missing_product_is_product_not_found() {
    let mock_server = MockServer::start().await;
    mount_category(&mock_server, "weight-mgmt").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let catalog = catalog_for(&mock_server);
    let result = catalog
        .verify_product_selection("weight-mgmt", "prod-missing", "dur-monthly")
        .await;

    assert_matches!(result, Err(CatalogError::ProductNotFound(id)) if id == "prod-missing");
}
