pub mod firestore;
pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use billing_cell::{InvoiceData, OrderData};

use crate::error::StoreError;
use crate::models::{
    ConsultationData, FlowSearchQuery, FlowStatus, StatusHistoryEntry, TelehealthFlow,
};

pub use firestore::FirestoreFlowStore;
pub use memory::MemoryFlowStore;
pub use supabase::SupabaseFlowStore;

/// Partial update applied by a transition. `status_history` carries the full
/// new log (old entries plus the appended ones) so every backend can write it
/// as one field.
#[derive(Debug, Clone, Default)]
pub struct FlowPatch {
    pub current_status: Option<FlowStatus>,
    pub product_id: Option<String>,
    pub duration_id: Option<String>,
    pub intake_form_data: Option<Value>,
    pub consultation_data: Option<ConsultationData>,
    pub order_data: Option<OrderData>,
    pub invoice_data: Option<InvoiceData>,
    pub status_history: Option<Vec<StatusHistoryEntry>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The single abstract persistence contract. Orchestrator logic never
/// branches on which backend sits behind this.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Point read. `Ok(None)` is a missing record, `Err` a transport problem.
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError>;

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError>;

    /// Compare-and-set write: the update only applies while the stored
    /// `version` equals `expected_version`, and the committed record carries
    /// `expected_version + 1`.
    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError>;

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError>;
}

pub(crate) fn apply_patch(flow: &mut TelehealthFlow, patch: &FlowPatch) {
    if let Some(status) = patch.current_status {
        flow.current_status = status;
    }
    if let Some(product_id) = &patch.product_id {
        flow.product_id = Some(product_id.clone());
    }
    if let Some(duration_id) = &patch.duration_id {
        flow.duration_id = Some(duration_id.clone());
    }
    if let Some(intake) = &patch.intake_form_data {
        flow.intake_form_data = Some(intake.clone());
    }
    if let Some(consultation) = &patch.consultation_data {
        flow.consultation_data = Some(consultation.clone());
    }
    if let Some(order) = &patch.order_data {
        flow.order_data = Some(order.clone());
    }
    if let Some(invoice) = &patch.invoice_data {
        flow.invoice_data = Some(invoice.clone());
    }
    if let Some(history) = &patch.status_history {
        flow.status_history = history.clone();
    }
    if let Some(updated_at) = patch.updated_at {
        flow.updated_at = updated_at;
    }
}
