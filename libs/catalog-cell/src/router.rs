// libs/catalog-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::{self, CatalogCellState};

pub fn catalog_routes(state: Arc<CatalogCellState>) -> Router {
    Router::new()
        .route("/categories", get(handlers::list_categories))
        .route(
            "/categories/{category_id}/products",
            get(handlers::get_category_products),
        )
        .with_state(state)
}
