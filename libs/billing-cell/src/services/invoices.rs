// libs/billing-cell/src/services/invoices.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::BillingError;
use crate::models::{InvoiceData, InvoiceRequest};

#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<InvoiceData, BillingError>;
    async fn void_invoice(&self, invoice_id: Uuid, reason: &str) -> Result<(), BillingError>;
}

pub struct InvoiceService {
    supabase: Arc<SupabaseClient>,
}

impl InvoiceService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

/// Invoice numbers look like `INV-20260830-1a2b3c4d`.
pub fn generate_invoice_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("INV-{}-{}", date, suffix)
}

#[async_trait]
impl InvoiceIssuer for InvoiceService {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<InvoiceData, BillingError> {
        if request.amount_cents <= 0 {
            return Err(BillingError::ValidationError(
                "Invoice amount must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let invoice_number = generate_invoice_number();
        let invoice_row = json!({
            "order_id": request.order_id,
            "patient_id": request.patient_id,
            "invoice_number": invoice_number,
            "amount_cents": request.amount_cents,
            "status": "open",
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
            .request_with_headers(
                Method::POST,
                "/rest/v1/invoices",
                Some(invoice_row),
                Some(headers),
            )
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BillingError::DatabaseError(
                "Failed to create invoice".to_string(),
            ));
        }

        let invoice_id = result[0]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| BillingError::DatabaseError("Created invoice has no id".to_string()))?;

        info!(
            "Invoice {} ({}) issued for order {}",
            invoice_id, invoice_number, request.order_id
        );

        Ok(InvoiceData {
            invoice_id,
            invoice_number,
            amount_cents: request.amount_cents,
            created_at: now,
        })
    }

    async fn void_invoice(&self, invoice_id: Uuid, reason: &str) -> Result<(), BillingError> {
        debug!("Voiding invoice {}: {}", invoice_id, reason);

        let path = format!("/rest/v1/invoices?id=eq.{}", invoice_id);
        let update = json!({
            "status": "void",
            "void_reason": reason,
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
            return Err(BillingError::InvoiceNotFound(invoice_id.to_string()));
        }

        info!("Invoice {} voided", invoice_id);
        Ok(())
    }
}
