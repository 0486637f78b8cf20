// libs/billing-cell/src/services/orders.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::BillingError;
use crate::models::{OrderData, OrderRequest};

/// Collaborator invoked by the approval transition. `cancel_order` is the
/// compensation path when a later side effect or the status write fails.
#[async_trait]
pub trait OrderProvisioner: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<OrderData, BillingError>;
    async fn cancel_order(&self, order_id: Uuid, reason: &str) -> Result<(), BillingError>;
}

pub struct OrderService {
    supabase: Arc<SupabaseClient>,
}

impl OrderService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl OrderProvisioner for OrderService {
    async fn create_order(&self, request: OrderRequest) -> Result<OrderData, BillingError> {
        if request.amount_cents <= 0 {
            return Err(BillingError::ValidationError(
                "Order amount must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let order_row = json!({
            "flow_id": request.flow_id,
            "patient_id": request.patient_id,
            "product_id": request.product_id,
            "duration_id": request.duration_id,
            "amount_cents": request.amount_cents,
            "status": "pending",
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/orders", Some(order_row), Some(headers))
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BillingError::DatabaseError(
                "Failed to create order".to_string(),
            ));
        }

        let order_id = result[0]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| BillingError::DatabaseError("Created order has no id".to_string()))?;

        info!(
            "Order {} created for flow {} ({} cents)",
            order_id, request.flow_id, request.amount_cents
        );

        Ok(OrderData {
            order_id,
            product_id: request.product_id,
            duration_id: request.duration_id,
            amount_cents: request.amount_cents,
            created_at: now,
        })
    }

    async fn cancel_order(&self, order_id: Uuid, reason: &str) -> Result<(), BillingError> {
        debug!("Cancelling order {}: {}", order_id, reason);

        let path = format!("/rest/v1/orders?id=eq.{}", order_id);
        let update = json!({
            "status": "cancelled",
            "cancellation_reason": reason,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(update), Some(headers))
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BillingError::OrderNotFound(order_id.to_string()));
        }

        info!("Order {} cancelled", order_id);
        Ok(())
    }
}
