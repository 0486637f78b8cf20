// libs/billing-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub flow_id: Uuid,
    pub patient_id: Uuid,
    pub product_id: String,
    pub duration_id: String,
    pub amount_cents: i64,
}

/// Embedded order summary stored on the flow record after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    pub order_id: Uuid,
    pub product_id: String,
    pub duration_id: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub amount_cents: i64,
}

/// Embedded invoice summary stored on the flow record after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}
