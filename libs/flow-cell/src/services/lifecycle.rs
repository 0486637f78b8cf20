// libs/flow-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::FlowError;
use crate::models::{FlowStatus, TelehealthFlow};

pub struct FlowLifecycleService {
    rules: FlowLifecycleRules,
}

impl FlowLifecycleService {
    pub fn new(rules: FlowLifecycleRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &FlowLifecycleRules {
        &self.rules
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: FlowStatus,
        new_status: FlowStatus,
    ) -> Result<(), FlowError> {
        debug!(
            "Validating status transition from {} to {}",
            current_status, new_status
        );

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(&new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(FlowError::InvalidStateTransition {
                current: current_status,
                attempted: new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: FlowStatus) -> Vec<FlowStatus> {
        match current_status {
            FlowStatus::Initialized => vec![
                FlowStatus::ProductSelected,
                FlowStatus::Cancelled,
            ],
            FlowStatus::ProductSelected => vec![
                FlowStatus::IntakeSubmitted,
                FlowStatus::Cancelled,
            ],
            FlowStatus::IntakeSubmitted => vec![
                FlowStatus::ConsultationPending,
                FlowStatus::ConsultationApproved,
                FlowStatus::Cancelled,
            ],
            FlowStatus::ConsultationPending => vec![
                FlowStatus::ConsultationApproved,
                FlowStatus::Cancelled,
            ],
            FlowStatus::ConsultationApproved => vec![
                FlowStatus::OrderCreated,
                FlowStatus::Cancelled,
            ],
            FlowStatus::OrderCreated => vec![
                FlowStatus::Completed,
                FlowStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            FlowStatus::Completed => vec![],
            FlowStatus::Cancelled => vec![],
        }
    }

    /// Automatic transition for stale flows: a non-terminal flow idle past
    /// the abandonment threshold is eligible for cancellation.
    pub fn auto_transition_for(
        &self,
        flow: &TelehealthFlow,
        current_time: DateTime<Utc>,
    ) -> Option<FlowStatus> {
        if flow.current_status.is_terminal() {
            return None;
        }

        let abandonment_threshold =
            flow.updated_at + Duration::days(self.rules.abandonment_threshold_days);
        if current_time > abandonment_threshold {
            return Some(FlowStatus::Cancelled);
        }

        None
    }

    /// Get recommended actions for a flow based on its current state
    pub fn get_recommended_actions(&self, current_status: FlowStatus) -> Vec<String> {
        match current_status {
            FlowStatus::Initialized => vec![
                "Present product recommendations".to_string(),
            ],
            FlowStatus::ProductSelected => vec![
                "Collect intake form".to_string(),
            ],
            FlowStatus::IntakeSubmitted => vec![
                "Queue for provider consultation".to_string(),
                "Review intake responses".to_string(),
            ],
            FlowStatus::ConsultationPending => vec![
                "Awaiting provider review".to_string(),
            ],
            FlowStatus::ConsultationApproved => vec![
                "Generate order and invoice".to_string(),
            ],
            FlowStatus::OrderCreated => vec![
                "Awaiting fulfillment".to_string(),
                "Send order confirmation".to_string(),
            ],
            FlowStatus::Completed => vec![
                "Send follow-up instructions".to_string(),
            ],
            FlowStatus::Cancelled => vec![
                "Process refund if applicable".to_string(),
            ],
        }
    }
}

impl Default for FlowLifecycleService {
    fn default() -> Self {
        Self::new(FlowLifecycleRules::default())
    }
}

/// Business rules for the flow lifecycle
#[derive(Debug, Clone)]
pub struct FlowLifecycleRules {
    pub abandonment_threshold_days: i64,
    pub auto_queue_consultation: bool,
    pub max_intake_bytes: usize,
}

impl Default for FlowLifecycleRules {
    fn default() -> Self {
        Self {
            abandonment_threshold_days: 30,
            auto_queue_consultation: false,
            max_intake_bytes: 64 * 1024,
        }
    }
}
