use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use catalog_cell::handlers::CatalogCellState;
use catalog_cell::router::catalog_routes;
use flow_cell::handlers::FlowCellState;
use flow_cell::router::flow_routes;

pub fn create_router(
    flow_state: Arc<FlowCellState>,
    catalog_state: Arc<CatalogCellState>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Telehealth Flow API is running!" }))
        .nest("/flows", flow_routes(flow_state))
        .nest("/catalog", catalog_routes(catalog_state))
}
