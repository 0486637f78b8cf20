// libs/catalog-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::error::CatalogError;
use crate::services::catalog::{ProductCatalogService, ProductLookup};

pub struct CatalogCellState {
    pub catalog: Arc<ProductCatalogService>,
}

fn map_catalog_error(e: CatalogError) -> AppError {
    match e {
        CatalogError::CategoryNotFound(id) => {
            AppError::NotFound(format!("Category not found: {}", id))
        }
        CatalogError::ProductNotFound(id) => {
            AppError::NotFound(format!("Product not found: {}", id))
        }
        CatalogError::DurationNotAvailable { .. } => AppError::BadRequest(e.to_string()),
        CatalogError::DatabaseError(msg) => AppError::Database(msg),
    }
}

pub async fn list_categories(
    State(state): State<Arc<CatalogCellState>>,
) -> Result<Json<Value>, AppError> {
    let categories = state
        .catalog
        .list_categories()
        .await
        .map_err(map_catalog_error)?;

    Ok(Json(json!({
        "success": true,
        "categories": categories
    })))
}

pub async fn get_category_products(
    State(state): State<Arc<CatalogCellState>>,
    Path(category_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let products = state
        .catalog
        .get_product_recommendations(&category_id)
        .await
        .map_err(map_catalog_error)?;

    Ok(Json(json!({
        "success": true,
        "category_id": category_id,
        "products": products
    })))
}
