// libs/flow-cell/tests/orchestrator_test.rs
mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use billing_cell::BillingError;
use flow_cell::error::{FlowError, SideEffectStage};
use flow_cell::models::{
    CancelFlowRequest, ConsultationApprovalRequest, FlowSearchQuery, FlowStatus,
    InitializeFlowRequest, ProductSelectionRequest,
};
use flow_cell::services::feed::FlowChangeFeed;
use flow_cell::services::lifecycle::FlowLifecycleRules;
use flow_cell::services::orchestrator::TelehealthFlowOrchestrator;
use flow_cell::store::{FlowPatch, FlowStore, MemoryFlowStore};

use common::{
    happy_invoices, happy_orders, harness, harness_with, initialize_request, permissive_catalog,
    ConflictingStore, MockInvoices, MockOrders,
};

fn selection_request() -> ProductSelectionRequest {
    ProductSelectionRequest {
        product_id: "semaglutide".to_string(),
        duration_id: "dur-monthly".to_string(),
    }
}

fn approval_request(approved: bool) -> ConsultationApprovalRequest {
    ConsultationApprovalRequest {
        approved,
        provider_id: Some(Uuid::new_v4()),
        notes: Some("Reviewed".to_string()),
    }
}

#[tokio::test]
async fn full_happy_path_reaches_completed() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    assert_eq!(flow.current_status, FlowStatus::Initialized);
    assert_eq!(flow.status_history.len(), 1);
    assert_eq!(flow.version, 1);

    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::ProductSelected);
    assert_eq!(flow.product_id.as_deref(), Some("semaglutide"));
    assert_eq!(flow.status_history.len(), 2);

    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210, "allergies": [] }))
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::IntakeSubmitted);
    assert!(flow.intake_form_data.is_some());

    let flow = h.orchestrator.queue_for_consultation(flow.id).await.unwrap();
    assert_eq!(flow.current_status, FlowStatus::ConsultationPending);
    assert_eq!(flow.status_history.len(), 4);

    let flow = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::OrderCreated);
    assert!(flow.order_data.is_some());
    assert!(flow.invoice_data.is_some());
    assert!(flow.consultation_data.as_ref().unwrap().approved);
    // Approval records both the approval and the order creation.
    assert_eq!(flow.status_history.len(), 6);
    assert_eq!(
        flow.status_history[4].status,
        FlowStatus::ConsultationApproved
    );
    assert_eq!(flow.status_history[5].status, FlowStatus::OrderCreated);

    let flow = h.orchestrator.complete_flow(flow.id).await.unwrap();
    assert_eq!(flow.current_status, FlowStatus::Completed);
    assert_eq!(flow.status_history.len(), 7);
    assert_eq!(flow.version, 6);
    assert!(!flow.is_active());
}

#[tokio::test]
async fn approval_can_skip_the_consultation_queue() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::IntakeSubmitted);

    let flow = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::OrderCreated);
}

#[tokio::test]
async fn rejection_cancels_and_blocks_further_transitions() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();

    let flow = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(false))
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::Cancelled);
    assert!(!flow.consultation_data.as_ref().unwrap().approved);
    assert!(flow.order_data.is_none());

    let err = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        FlowError::InvalidStateTransition {
            current: FlowStatus::Cancelled,
            attempted: FlowStatus::ProductSelected,
        }
    );
}

#[tokio::test]
async fn repeated_selection_is_idempotent() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let first = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();

    assert_eq!(second.current_status, FlowStatus::ProductSelected);
    assert_eq!(second.status_history.len(), first.status_history.len());
    assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn repeated_approval_is_idempotent() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();

    let first = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap();

    assert_eq!(second.status_history.len(), first.status_history.len());
    assert_eq!(
        second.order_data.as_ref().unwrap().order_id,
        first.order_data.as_ref().unwrap().order_id
    );
}

#[tokio::test]
async fn order_failure_leaves_flow_untouched() {
    let mut orders = MockOrders::new();
    orders
        .expect_create_order()
        .returning(|_| Err(BillingError::DatabaseError("orders table down".to_string())));

    let mut invoices = MockInvoices::new();
    invoices.expect_create_invoice().times(0);

    let h = harness(permissive_catalog(), orders, invoices);

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();
    let flow = h.orchestrator.queue_for_consultation(flow.id).await.unwrap();

    let err = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        FlowError::SideEffectFailure {
            stage: SideEffectStage::OrderCreation,
            ..
        }
    );

    let current = h.orchestrator.get_flow(flow.id).await.unwrap();
    assert_eq!(current.current_status, FlowStatus::ConsultationPending);
    assert!(current.order_data.is_none());
    assert_eq!(current.version, flow.version);
}

#[tokio::test]
async fn invoice_failure_cancels_the_created_order() {
    let mut orders = MockOrders::new();
    orders.expect_create_order().times(1).returning(|request| {
        Ok(billing_cell::OrderData {
            order_id: Uuid::new_v4(),
            product_id: request.product_id,
            duration_id: request.duration_id,
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
        })
    });
    orders.expect_cancel_order().times(1).returning(|_, _| Ok(()));

    let mut invoices = MockInvoices::new();
    invoices
        .expect_create_invoice()
        .returning(|_| Err(BillingError::DatabaseError("invoices table down".to_string())));

    let h = harness(permissive_catalog(), orders, invoices);

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        FlowError::SideEffectFailure {
            stage: SideEffectStage::InvoiceGeneration,
            ..
        }
    );

    let current = h.orchestrator.get_flow(flow.id).await.unwrap();
    assert_eq!(current.current_status, FlowStatus::IntakeSubmitted);
    assert!(current.order_data.is_none());
    assert!(current.invoice_data.is_none());
}

#[tokio::test]
async fn unknown_flow_is_not_found() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let err = h.orchestrator.get_flow(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, FlowError::NotFound);

    let err = h
        .orchestrator
        .process_product_selection(Uuid::new_v4(), selection_request())
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::NotFound);
}

#[tokio::test]
async fn oversized_intake_is_rejected() {
    let rules = FlowLifecycleRules {
        max_intake_bytes: 64,
        ..FlowLifecycleRules::default()
    };
    let h = harness_with(permissive_catalog(), happy_orders(), happy_invoices(), rules);

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "notes": "x".repeat(200) }))
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::ValidationError(_));

    let err = h
        .orchestrator
        .process_intake_form(flow.id, json!("not an object"))
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::ValidationError(_));
}

#[tokio::test]
async fn auto_queue_rule_lands_intake_in_consultation_pending() {
    let rules = FlowLifecycleRules {
        auto_queue_consultation: true,
        ..FlowLifecycleRules::default()
    };
    let h = harness_with(permissive_catalog(), happy_orders(), happy_invoices(), rules);

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = h
        .orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = h
        .orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();

    assert_eq!(flow.current_status, FlowStatus::ConsultationPending);
    assert_eq!(flow.status_history.len(), 4);
    assert_eq!(flow.status_history[2].status, FlowStatus::IntakeSubmitted);
    assert_eq!(
        flow.status_history[3].status,
        FlowStatus::ConsultationPending
    );
}

#[tokio::test]
async fn losing_a_concurrent_write_surfaces_conflict() {
    let memory = Arc::new(MemoryFlowStore::new());
    let conflicting = Arc::new(ConflictingStore::new(memory.clone()));
    let feed = Arc::new(FlowChangeFeed::new());

    let orchestrator = TelehealthFlowOrchestrator::new(
        conflicting.clone(),
        Arc::new(permissive_catalog()),
        Arc::new(happy_orders()),
        Arc::new(happy_invoices()),
        feed,
        FlowLifecycleRules::default(),
    );

    let flow = orchestrator.initialize_flow(initialize_request()).await.unwrap();

    conflicting.conflict_on_next_update();
    let err = orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::Conflict { expected_version: 1 });

    // The retry sees the real version and goes through.
    let flow = orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    assert_eq!(flow.current_status, FlowStatus::ProductSelected);
}

#[tokio::test]
async fn conflict_with_target_already_held_is_idempotent_success() {
    let memory = Arc::new(MemoryFlowStore::new());
    let conflicting = Arc::new(ConflictingStore::new(memory.clone()));
    let feed = Arc::new(FlowChangeFeed::new());

    let orchestrator = TelehealthFlowOrchestrator::new(
        conflicting.clone(),
        Arc::new(permissive_catalog()),
        Arc::new(happy_orders()),
        Arc::new(happy_invoices()),
        feed,
        FlowLifecycleRules::default(),
    );

    let flow = orchestrator.initialize_flow(initialize_request()).await.unwrap();

    // A concurrent writer lands the same selection between the read and the
    // version-guarded write.
    conflicting.conflict_with_winner(FlowPatch {
        current_status: Some(FlowStatus::ProductSelected),
        product_id: Some("semaglutide".to_string()),
        duration_id: Some("dur-monthly".to_string()),
        updated_at: Some(Utc::now()),
        ..Default::default()
    });

    let result = orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    assert_eq!(result.current_status, FlowStatus::ProductSelected);
    assert_eq!(result.version, 2);
}

#[tokio::test]
async fn approval_conflict_rolls_back_its_side_effects() {
    let memory = Arc::new(MemoryFlowStore::new());
    let conflicting = Arc::new(ConflictingStore::new(memory.clone()));
    let feed = Arc::new(FlowChangeFeed::new());

    let mut orders = MockOrders::new();
    orders.expect_create_order().times(1).returning(|request| {
        Ok(billing_cell::OrderData {
            order_id: Uuid::new_v4(),
            product_id: request.product_id,
            duration_id: request.duration_id,
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
        })
    });
    orders.expect_cancel_order().times(1).returning(|_, _| Ok(()));

    let mut invoices = MockInvoices::new();
    invoices.expect_create_invoice().times(1).returning(|request| {
        Ok(billing_cell::InvoiceData {
            invoice_id: Uuid::new_v4(),
            invoice_number: "INV-20260830-1a2b3c4d".to_string(),
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
        })
    });
    invoices.expect_void_invoice().times(1).returning(|_, _| Ok(()));

    let orchestrator = TelehealthFlowOrchestrator::new(
        conflicting.clone(),
        Arc::new(permissive_catalog()),
        Arc::new(orders),
        Arc::new(invoices),
        feed,
        FlowLifecycleRules::default(),
    );

    let flow = orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let flow = orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let flow = orchestrator
        .process_intake_form(flow.id, json!({ "weight": 210 }))
        .await
        .unwrap();

    conflicting.conflict_on_next_update();
    let err = orchestrator
        .process_consultation_approval(flow.id, approval_request(true))
        .await
        .unwrap_err();
    assert_matches!(err, FlowError::Conflict { .. });

    // Mock drop verifies the order was cancelled and the invoice voided.
    let current = orchestrator.get_flow(flow.id).await.unwrap();
    assert_eq!(current.current_status, FlowStatus::IntakeSubmitted);
    assert!(current.order_data.is_none());
}

#[tokio::test]
async fn sweep_cancels_only_stale_active_flows() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());

    let stale = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let fresh = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let done = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    h.orchestrator
        .cancel_flow(
            done.id,
            CancelFlowRequest {
                reason: Some("Patient dropped off".to_string()),
            },
        )
        .await
        .unwrap();

    // Age the stale flow past the threshold.
    let old = Utc::now() - Duration::days(45);
    h.store
        .update_flow(
            stale.id,
            FlowPatch {
                updated_at: Some(old),
                ..Default::default()
            },
            1,
        )
        .await
        .unwrap();

    let cancelled = h.orchestrator.sweep_abandoned_flows(Utc::now()).await.unwrap();
    assert_eq!(cancelled, vec![stale.id]);

    let stale = h.orchestrator.get_flow(stale.id).await.unwrap();
    assert_eq!(stale.current_status, FlowStatus::Cancelled);
    let fresh = h.orchestrator.get_flow(fresh.id).await.unwrap();
    assert_eq!(fresh.current_status, FlowStatus::Initialized);
}

#[tokio::test]
async fn stats_count_by_status_and_rates() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());
    let patient_id = Uuid::new_v4();

    for _ in 0..3 {
        let request = InitializeFlowRequest {
            patient_id,
            ..initialize_request()
        };
        h.orchestrator.initialize_flow(request).await.unwrap();
    }
    let cancelled = h
        .orchestrator
        .initialize_flow(InitializeFlowRequest {
            patient_id,
            ..initialize_request()
        })
        .await
        .unwrap();
    h.orchestrator
        .cancel_flow(cancelled.id, CancelFlowRequest { reason: None })
        .await
        .unwrap();

    let stats = h.orchestrator.flow_stats(Some(patient_id)).await.unwrap();
    assert_eq!(stats.total_flows, 4);
    assert_eq!(stats.completion_rate, 0.0);
    assert_eq!(stats.cancellation_rate, 0.25);

    let initialized = stats
        .by_status
        .iter()
        .find(|(s, _)| *s == FlowStatus::Initialized)
        .map(|(_, n)| *n);
    assert_eq!(initialized, Some(3));
}

#[tokio::test]
async fn search_filters_by_patient_and_status() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());
    let patient_id = Uuid::new_v4();

    let mine = h
        .orchestrator
        .initialize_flow(InitializeFlowRequest {
            patient_id,
            ..initialize_request()
        })
        .await
        .unwrap();
    h.orchestrator.initialize_flow(initialize_request()).await.unwrap();

    let results = h
        .orchestrator
        .search_flows(FlowSearchQuery {
            patient_id: Some(patient_id),
            status: Some(FlowStatus::Initialized),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, mine.id);
}

#[tokio::test]
async fn committed_writes_reach_the_change_feed() {
    let h = harness(permissive_catalog(), happy_orders(), happy_invoices());
    let mut all = h.feed.subscribe_all();

    let flow = h.orchestrator.initialize_flow(initialize_request()).await.unwrap();
    let seen = all.recv().await.unwrap();
    assert_eq!(seen.id, flow.id);
    assert_eq!(seen.current_status, FlowStatus::Initialized);

    h.orchestrator
        .process_product_selection(flow.id, selection_request())
        .await
        .unwrap();
    let seen = all.recv().await.unwrap();
    assert_eq!(seen.current_status, FlowStatus::ProductSelected);
}
