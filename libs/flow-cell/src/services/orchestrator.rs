// libs/flow-cell/src/services/orchestrator.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use billing_cell::{InvoiceIssuer, InvoiceRequest, OrderData, OrderProvisioner, OrderRequest};
use catalog_cell::{CatalogError, Product, ProductLookup};

use crate::error::{FlowError, SideEffectStage, StoreError};
use crate::models::{
    CancelFlowRequest, ConsultationApprovalRequest, ConsultationData, FlowLifecycleView,
    FlowSearchQuery, FlowStats, FlowStatus, InitializeFlowRequest, ProductSelectionRequest,
    StatusHistoryEntry, TelehealthFlow,
};
use crate::services::feed::FlowChangeFeed;
use crate::services::lifecycle::{FlowLifecycleRules, FlowLifecycleService};
use crate::store::{FlowPatch, FlowStore};

/// Owns transition validation and side-effect triggering for flows. All
/// mutations of a flow record go through here; the change feed receives every
/// committed write. Operations return structured results and never panic
/// across this boundary.
pub struct TelehealthFlowOrchestrator {
    store: Arc<dyn FlowStore>,
    catalog: Arc<dyn ProductLookup>,
    orders: Arc<dyn OrderProvisioner>,
    invoices: Arc<dyn InvoiceIssuer>,
    feed: Arc<FlowChangeFeed>,
    lifecycle: FlowLifecycleService,
}

impl TelehealthFlowOrchestrator {
    pub fn new(
        store: Arc<dyn FlowStore>,
        catalog: Arc<dyn ProductLookup>,
        orders: Arc<dyn OrderProvisioner>,
        invoices: Arc<dyn InvoiceIssuer>,
        feed: Arc<FlowChangeFeed>,
        rules: FlowLifecycleRules,
    ) -> Self {
        Self {
            store,
            catalog,
            orders,
            invoices,
            feed,
            lifecycle: FlowLifecycleService::new(rules),
        }
    }

    pub fn feed(&self) -> Arc<FlowChangeFeed> {
        Arc::clone(&self.feed)
    }

    /// Create a flow record in `Initialized` with its first history entry.
    pub async fn initialize_flow(
        &self,
        request: InitializeFlowRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        info!(
            "Initializing flow for patient {} in category {}",
            request.patient_id, request.category_id
        );

        if let Some(product_id) = &request.product_id {
            let duration_id = request.duration_id.as_ref().ok_or_else(|| {
                FlowError::ValidationError(
                    "duration_id is required when product_id is pre-selected".to_string(),
                )
            })?;
            self.catalog
                .verify_product_selection(&request.category_id, product_id, duration_id)
                .await
                .map_err(map_catalog_error)?;
        } else {
            // Existence check only; the recommendations themselves are
            // presented by the session later.
            self.catalog
                .get_product_recommendations(&request.category_id)
                .await
                .map_err(map_catalog_error)?;
        }

        let now = Utc::now();
        let flow = TelehealthFlow {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            category_id: request.category_id,
            product_id: request.product_id,
            duration_id: request.duration_id,
            current_status: FlowStatus::Initialized,
            status_history: vec![StatusHistoryEntry {
                status: FlowStatus::Initialized,
                changed_at: now,
                note: None,
            }],
            intake_form_data: None,
            consultation_data: None,
            order_data: None,
            invoice_data: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert_flow(&flow).await?;
        self.feed.publish(&created).await;

        info!("Flow {} initialized", created.id);
        Ok(created)
    }

    /// Record the chosen product and duration, after verifying both against
    /// the catalog.
    pub async fn process_product_selection(
        &self,
        flow_id: Uuid,
        request: ProductSelectionRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        // Duplicate submission of the same selection is a no-op success.
        if flow.current_status == FlowStatus::ProductSelected
            && flow.product_id.as_deref() == Some(request.product_id.as_str())
            && flow.duration_id.as_deref() == Some(request.duration_id.as_str())
        {
            debug!("Flow {} already holds this product selection", flow_id);
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::ProductSelected)?;

        self.catalog
            .verify_product_selection(&flow.category_id, &request.product_id, &request.duration_id)
            .await
            .map_err(map_catalog_error)?;

        let now = Utc::now();
        let patch = FlowPatch {
            current_status: Some(FlowStatus::ProductSelected),
            product_id: Some(request.product_id.clone()),
            duration_id: Some(request.duration_id.clone()),
            status_history: Some(appended_history(
                &flow,
                &[(FlowStatus::ProductSelected, None)],
                now,
            )),
            updated_at: Some(now),
            ..Default::default()
        };

        let updated = self
            .commit(&flow, patch, FlowStatus::ProductSelected)
            .await?;
        info!(
            "Flow {} selected product {} ({})",
            flow_id, request.product_id, request.duration_id
        );
        Ok(updated)
    }

    /// Store the intake payload. When the lifecycle rules enable it, the flow
    /// advances straight on to `ConsultationPending`.
    pub async fn process_intake_form(
        &self,
        flow_id: Uuid,
        form_data: Value,
    ) -> Result<TelehealthFlow, FlowError> {
        if !form_data.is_object() {
            return Err(FlowError::ValidationError(
                "Intake form payload must be a JSON object".to_string(),
            ));
        }
        let encoded_len = serde_json::to_vec(&form_data)
            .map_err(|e| FlowError::ValidationError(e.to_string()))?
            .len();
        if encoded_len > self.lifecycle.rules().max_intake_bytes {
            return Err(FlowError::ValidationError(format!(
                "Intake form payload exceeds {} bytes",
                self.lifecycle.rules().max_intake_bytes
            )));
        }

        let flow = self.require_flow(flow_id).await?;

        let already_submitted = matches!(
            flow.current_status,
            FlowStatus::IntakeSubmitted | FlowStatus::ConsultationPending
        );
        if already_submitted && flow.intake_form_data.as_ref() == Some(&form_data) {
            debug!("Flow {} already holds this intake submission", flow_id);
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::IntakeSubmitted)?;

        let now = Utc::now();
        let patch = FlowPatch {
            current_status: Some(FlowStatus::IntakeSubmitted),
            intake_form_data: Some(form_data),
            status_history: Some(appended_history(
                &flow,
                &[(FlowStatus::IntakeSubmitted, None)],
                now,
            )),
            updated_at: Some(now),
            ..Default::default()
        };

        let submitted = self
            .commit(&flow, patch, FlowStatus::IntakeSubmitted)
            .await?;
        info!("Flow {} intake submitted", flow_id);

        if !self.lifecycle.rules().auto_queue_consultation {
            return Ok(submitted);
        }
        self.queue_for_consultation(flow_id).await
    }

    /// Move a submitted intake into the provider review queue.
    pub async fn queue_for_consultation(
        &self,
        flow_id: Uuid,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        if flow.current_status == FlowStatus::ConsultationPending {
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::ConsultationPending)?;

        let now = Utc::now();
        let patch = FlowPatch {
            current_status: Some(FlowStatus::ConsultationPending),
            status_history: Some(appended_history(
                &flow,
                &[(FlowStatus::ConsultationPending, None)],
                now,
            )),
            updated_at: Some(now),
            ..Default::default()
        };

        let updated = self
            .commit(&flow, patch, FlowStatus::ConsultationPending)
            .await?;
        info!("Flow {} queued for consultation", flow_id);
        Ok(updated)
    }

    /// Provider decision. Approval creates the order and invoice before the
    /// status write so a flow is never persisted approved without its order;
    /// rejection cancels the flow.
    pub async fn process_consultation_approval(
        &self,
        flow_id: Uuid,
        request: ConsultationApprovalRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        // Duplicate decisions are no-op successes.
        if request.approved && flow.current_status == FlowStatus::OrderCreated {
            return Ok(flow);
        }
        if !request.approved && flow.current_status == FlowStatus::Cancelled {
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::ConsultationApproved)?;

        let now = Utc::now();
        let consultation = ConsultationData {
            approved: request.approved,
            provider_id: request.provider_id,
            notes: request.notes.clone(),
            reviewed_at: now,
        };

        if !request.approved {
            let patch = FlowPatch {
                current_status: Some(FlowStatus::Cancelled),
                consultation_data: Some(consultation),
                status_history: Some(appended_history(
                    &flow,
                    &[(FlowStatus::Cancelled, Some("Consultation rejected".to_string()))],
                    now,
                )),
                updated_at: Some(now),
                ..Default::default()
            };

            let updated = self.commit(&flow, patch, FlowStatus::Cancelled).await?;
            info!("Flow {} rejected at consultation", flow_id);
            return Ok(updated);
        }

        self.approve_and_provision(flow, consultation, now).await
    }

    async fn approve_and_provision(
        &self,
        flow: TelehealthFlow,
        consultation: ConsultationData,
        now: DateTime<Utc>,
    ) -> Result<TelehealthFlow, FlowError> {
        let product_id = flow.product_id.clone().ok_or_else(|| {
            FlowError::ValidationError("Flow has no product selection".to_string())
        })?;
        let duration_id = flow.duration_id.clone().ok_or_else(|| {
            FlowError::ValidationError("Flow has no duration selection".to_string())
        })?;

        let selection = self
            .catalog
            .verify_product_selection(&flow.category_id, &product_id, &duration_id)
            .await
            .map_err(map_catalog_error)?;

        let order = self
            .orders
            .create_order(OrderRequest {
                flow_id: flow.id,
                patient_id: flow.patient_id,
                product_id: product_id.clone(),
                duration_id: duration_id.clone(),
                amount_cents: selection.amount_cents(),
            })
            .await
            .map_err(|e| FlowError::SideEffectFailure {
                stage: SideEffectStage::OrderCreation,
                message: e.to_string(),
            })?;

        let invoice = match self
            .invoices
            .create_invoice(InvoiceRequest {
                order_id: order.order_id,
                patient_id: flow.patient_id,
                amount_cents: order.amount_cents,
            })
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                self.void_order(&order, "invoice generation failed").await;
                return Err(FlowError::SideEffectFailure {
                    stage: SideEffectStage::InvoiceGeneration,
                    message: e.to_string(),
                });
            }
        };

        // Approval commits two history entries in one version-guarded write.
        let patch = FlowPatch {
            current_status: Some(FlowStatus::OrderCreated),
            consultation_data: Some(consultation),
            order_data: Some(order.clone()),
            invoice_data: Some(invoice.clone()),
            status_history: Some(appended_history(
                &flow,
                &[
                    (FlowStatus::ConsultationApproved, None),
                    (FlowStatus::OrderCreated, None),
                ],
                now,
            )),
            updated_at: Some(now),
            ..Default::default()
        };

        match self.store.update_flow(flow.id, patch, flow.version).await {
            Ok(updated) => {
                self.feed.publish(&updated).await;
                info!(
                    "Flow {} approved; order {} and invoice {} recorded",
                    flow.id, order.order_id, invoice.invoice_number
                );
                Ok(updated)
            }
            Err(StoreError::VersionConflict { .. }) => {
                // A concurrent writer won the race; our side effects are
                // duplicates and must not survive.
                warn!(
                    "Flow {} approval lost a concurrent update, rolling back side effects",
                    flow.id
                );
                if let Err(e) = self
                    .invoices
                    .void_invoice(invoice.invoice_id, "approval superseded")
                    .await
                {
                    warn!("Failed to void invoice {}: {}", invoice.invoice_id, e);
                }
                self.void_order(&order, "approval superseded").await;

                let current = self.require_flow(flow.id).await?;
                if current.current_status == FlowStatus::OrderCreated {
                    Ok(current)
                } else {
                    Err(FlowError::Conflict {
                        expected_version: flow.version,
                    })
                }
            }
            Err(e) => {
                warn!(
                    "Flow {} status write failed after side effects, rolling back",
                    flow.id
                );
                if let Err(void_err) = self
                    .invoices
                    .void_invoice(invoice.invoice_id, "flow update failed")
                    .await
                {
                    warn!("Failed to void invoice {}: {}", invoice.invoice_id, void_err);
                }
                self.void_order(&order, "flow update failed").await;
                Err(e.into())
            }
        }
    }

    /// Mark a provisioned flow complete. The fulfillment webhook that calls
    /// this is out of scope.
    pub async fn complete_flow(&self, flow_id: Uuid) -> Result<TelehealthFlow, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        if flow.current_status == FlowStatus::Completed {
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::Completed)?;

        let now = Utc::now();
        let patch = FlowPatch {
            current_status: Some(FlowStatus::Completed),
            status_history: Some(appended_history(&flow, &[(FlowStatus::Completed, None)], now)),
            updated_at: Some(now),
            ..Default::default()
        };

        let updated = self.commit(&flow, patch, FlowStatus::Completed).await?;
        info!("Flow {} completed", flow_id);
        Ok(updated)
    }

    /// Explicit cancellation from any non-terminal state.
    pub async fn cancel_flow(
        &self,
        flow_id: Uuid,
        request: CancelFlowRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        if flow.current_status == FlowStatus::Cancelled {
            return Ok(flow);
        }

        self.lifecycle
            .validate_status_transition(flow.current_status, FlowStatus::Cancelled)?;

        let now = Utc::now();
        let patch = FlowPatch {
            current_status: Some(FlowStatus::Cancelled),
            status_history: Some(appended_history(
                &flow,
                &[(FlowStatus::Cancelled, request.reason.clone())],
                now,
            )),
            updated_at: Some(now),
            ..Default::default()
        };

        let updated = self.commit(&flow, patch, FlowStatus::Cancelled).await?;
        info!(
            "Flow {} cancelled{}",
            flow_id,
            request
                .reason
                .map(|r| format!(": {}", r))
                .unwrap_or_default()
        );
        Ok(updated)
    }

    pub async fn get_flow(&self, flow_id: Uuid) -> Result<TelehealthFlow, FlowError> {
        self.require_flow(flow_id).await
    }

    pub async fn search_flows(
        &self,
        query: FlowSearchQuery,
    ) -> Result<Vec<TelehealthFlow>, FlowError> {
        Ok(self.store.list_flows(&query).await?)
    }

    /// Totals per status plus completion and cancellation rates.
    pub async fn flow_stats(&self, patient_id: Option<Uuid>) -> Result<FlowStats, FlowError> {
        let query = FlowSearchQuery {
            patient_id,
            ..Default::default()
        };
        let flows = self.store.list_flows(&query).await?;

        let total_flows = flows.len() as i32;
        let mut counts = std::collections::HashMap::new();
        for flow in &flows {
            *counts.entry(flow.current_status).or_insert(0) += 1;
        }

        let completed = *counts.get(&FlowStatus::Completed).unwrap_or(&0);
        let cancelled = *counts.get(&FlowStatus::Cancelled).unwrap_or(&0);
        let (completion_rate, cancellation_rate) = if total_flows > 0 {
            (
                completed as f32 / total_flows as f32,
                cancelled as f32 / total_flows as f32,
            )
        } else {
            (0.0, 0.0)
        };

        Ok(FlowStats {
            total_flows,
            by_status: counts.into_iter().collect(),
            completion_rate,
            cancellation_rate,
        })
    }

    pub async fn get_product_recommendations(
        &self,
        category_id: &str,
    ) -> Result<Vec<Product>, FlowError> {
        self.catalog
            .get_product_recommendations(category_id)
            .await
            .map_err(map_catalog_error)
    }

    pub async fn lifecycle_view(&self, flow_id: Uuid) -> Result<FlowLifecycleView, FlowError> {
        let flow = self.require_flow(flow_id).await?;

        Ok(FlowLifecycleView {
            current_status: flow.current_status,
            valid_transitions: self.lifecycle.get_valid_transitions(flow.current_status),
            recommended_actions: self.lifecycle.get_recommended_actions(flow.current_status),
        })
    }

    /// Cancel flows idle past the abandonment threshold. Conflicts are
    /// skipped; another writer touching the flow means it is not idle.
    pub async fn sweep_abandoned_flows(
        &self,
        current_time: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, FlowError> {
        let flows = self.store.list_flows(&FlowSearchQuery::default()).await?;

        let mut cancelled = Vec::new();
        for flow in flows {
            if self.lifecycle.auto_transition_for(&flow, current_time)
                != Some(FlowStatus::Cancelled)
            {
                continue;
            }

            let result = self
                .cancel_flow(
                    flow.id,
                    CancelFlowRequest {
                        reason: Some("Abandoned flow swept".to_string()),
                    },
                )
                .await;

            match result {
                Ok(_) => cancelled.push(flow.id),
                Err(FlowError::Conflict { .. }) => {
                    debug!("Flow {} was updated during the sweep, skipping", flow.id);
                }
                Err(e) => warn!("Failed to sweep flow {}: {}", flow.id, e),
            }
        }

        info!("Abandonment sweep cancelled {} flows", cancelled.len());
        Ok(cancelled)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn require_flow(&self, flow_id: Uuid) -> Result<TelehealthFlow, FlowError> {
        self.store
            .fetch_flow(flow_id)
            .await?
            .ok_or(FlowError::NotFound)
    }

    /// Version-guarded write. A losing writer re-reads once: if the requested
    /// target already holds, the call is an idempotent success, otherwise the
    /// conflict is surfaced.
    async fn commit(
        &self,
        flow: &TelehealthFlow,
        patch: FlowPatch,
        target: FlowStatus,
    ) -> Result<TelehealthFlow, FlowError> {
        match self.store.update_flow(flow.id, patch, flow.version).await {
            Ok(updated) => {
                self.feed.publish(&updated).await;
                Ok(updated)
            }
            Err(StoreError::VersionConflict { .. }) => {
                let current = self.require_flow(flow.id).await?;
                if current.current_status == target {
                    Ok(current)
                } else {
                    Err(FlowError::Conflict {
                        expected_version: flow.version,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn void_order(&self, order: &OrderData, reason: &str) {
        if let Err(e) = self.orders.cancel_order(order.order_id, reason).await {
            warn!("Failed to cancel order {}: {}", order.order_id, e);
        }
    }
}

fn appended_history(
    flow: &TelehealthFlow,
    entries: &[(FlowStatus, Option<String>)],
    now: DateTime<Utc>,
) -> Vec<StatusHistoryEntry> {
    let mut history = flow.status_history.clone();
    for (status, note) in entries {
        history.push(StatusHistoryEntry {
            status: *status,
            changed_at: now,
            note: note.clone(),
        });
    }
    history
}

fn map_catalog_error(e: CatalogError) -> FlowError {
    match e {
        CatalogError::CategoryNotFound(id) => FlowError::CategoryNotFound(id),
        CatalogError::ProductNotFound(id) => FlowError::ProductNotFound(id),
        CatalogError::DurationNotAvailable { .. } => FlowError::ValidationError(e.to_string()),
        CatalogError::DatabaseError(msg) => FlowError::TransportFailure(msg),
    }
}
