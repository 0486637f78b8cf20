// libs/flow-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use billing_cell::{InvoiceData, OrderData};

// ==============================================================================
// CORE FLOW MODELS
// ==============================================================================

/// A single patient's traversal through the intake-to-order pipeline,
/// persisted as a state machine. Mutated only through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelehealthFlow {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub category_id: String,
    pub product_id: Option<String>,
    pub duration_id: Option<String>,
    pub current_status: FlowStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub intake_form_data: Option<Value>,
    pub consultation_data: Option<ConsultationData>,
    pub order_data: Option<OrderData>,
    pub invoice_data: Option<InvoiceData>,
    /// Optimistic-concurrency counter; every committed write increments it
    /// and every write is conditioned on it.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TelehealthFlow {
    pub fn is_active(&self) -> bool {
        !self.current_status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Initialized,
    ProductSelected,
    IntakeSubmitted,
    ConsultationPending,
    ConsultationApproved,
    OrderCreated,
    Completed,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Cancelled)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Initialized => write!(f, "initialized"),
            FlowStatus::ProductSelected => write!(f, "product_selected"),
            FlowStatus::IntakeSubmitted => write!(f, "intake_submitted"),
            FlowStatus::ConsultationPending => write!(f, "consultation_pending"),
            FlowStatus::ConsultationApproved => write!(f, "consultation_approved"),
            FlowStatus::OrderCreated => write!(f, "order_created"),
            FlowStatus::Completed => write!(f, "completed"),
            FlowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry of the append-only audit log. Entries are never removed or
/// reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: FlowStatus,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationData {
    pub approved: bool,
    pub provider_id: Option<Uuid>,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeFlowRequest {
    pub patient_id: Uuid,
    pub category_id: String,
    pub product_id: Option<String>,
    pub duration_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSelectionRequest {
    pub product_id: String,
    pub duration_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationApprovalRequest {
    pub approved: bool,
    pub provider_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelFlowRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSearchQuery {
    pub patient_id: Option<Uuid>,
    pub category_id: Option<String>,
    pub status: Option<FlowStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStats {
    pub total_flows: i32,
    pub by_status: Vec<(FlowStatus, i32)>,
    pub completion_rate: f32,
    pub cancellation_rate: f32,
}

/// Worklist view of where a flow can go next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowLifecycleView {
    pub current_status: FlowStatus,
    pub valid_transitions: Vec<FlowStatus>,
    pub recommended_actions: Vec<String>,
}
