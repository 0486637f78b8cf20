// libs/catalog-cell/src/services/catalog.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use shared_database::supabase::SupabaseClient;

use crate::error::CatalogError;
use crate::models::{Category, Product, ProductSelection};

/// The seam the flow orchestrator consumes. Stateless lookup, no caching.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn get_product_recommendations(
        &self,
        category_id: &str,
    ) -> Result<Vec<Product>, CatalogError>;

    async fn verify_product_selection(
        &self,
        category_id: &str,
        product_id: &str,
        duration_id: &str,
    ) -> Result<ProductSelection, CatalogError>;
}

pub struct ProductCatalogService {
    supabase: Arc<SupabaseClient>,
}

impl ProductCatalogService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        debug!("Listing active categories");

        let path = "/rest/v1/categories?is_active=eq.true&order=display_order.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Category>, _>>()
            .map_err(|e| CatalogError::DatabaseError(format!("Failed to parse categories: {}", e)))
    }

    async fn verify_category_exists(&self, category_id: &str) -> Result<(), CatalogError> {
        let path = format!("/rest/v1/categories?id=eq.{}&is_active=eq.true", category_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(CatalogError::CategoryNotFound(category_id.to_string()));
        }

        Ok(())
    }

    async fn fetch_product(
        &self,
        category_id: &str,
        product_id: &str,
    ) -> Result<Option<Product>, CatalogError> {
        let path = format!(
            "/rest/v1/products?id=eq.{}&category_id=eq.{}&is_active=eq.true",
            product_id, category_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Ok(None);
        }

        let product: Product = serde_json::from_value(result[0].clone())
            .map_err(|e| CatalogError::DatabaseError(format!("Failed to parse product: {}", e)))?;

        Ok(Some(product))
    }
}

#[async_trait]
impl ProductLookup for ProductCatalogService {
    async fn get_product_recommendations(
        &self,
        category_id: &str,
    ) -> Result<Vec<Product>, CatalogError> {
        debug!("Fetching product recommendations for category {}", category_id);

        self.verify_category_exists(category_id).await?;

        let path = format!(
            "/rest/v1/products?category_id=eq.{}&is_active=eq.true&order=display_order.asc",
            category_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| CatalogError::DatabaseError(e.to_string()))?;

        let products: Vec<Product> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Product>, _>>()
            .map_err(|e| CatalogError::DatabaseError(format!("Failed to parse products: {}", e)))?;

        info!(
            "Found {} active products for category {}",
            products.len(),
            category_id
        );
        Ok(products)
    }

    async fn verify_product_selection(
        &self,
        category_id: &str,
        product_id: &str,
        duration_id: &str,
    ) -> Result<ProductSelection, CatalogError> {
        debug!(
            "Verifying product selection {}/{} for category {}",
            product_id, duration_id, category_id
        );

        self.verify_category_exists(category_id).await?;

        let product = self
            .fetch_product(category_id, product_id)
            .await?
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))?;

        let duration = product
            .durations
            .iter()
            .find(|d| d.id == duration_id)
            .cloned()
            .ok_or_else(|| CatalogError::DurationNotAvailable {
                product_id: product_id.to_string(),
                duration_id: duration_id.to_string(),
            })?;

        Ok(ProductSelection { product, duration })
    }
}
