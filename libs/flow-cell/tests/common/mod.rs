// libs/flow-cell/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use billing_cell::{
    BillingError, InvoiceData, InvoiceIssuer, InvoiceRequest, OrderData, OrderProvisioner,
    OrderRequest,
};
use catalog_cell::{CatalogError, Product, ProductDuration, ProductLookup, ProductSelection};
use flow_cell::error::StoreError;
use flow_cell::models::{FlowSearchQuery, InitializeFlowRequest, TelehealthFlow};
use flow_cell::services::feed::FlowChangeFeed;
use flow_cell::services::lifecycle::FlowLifecycleRules;
use flow_cell::services::orchestrator::TelehealthFlowOrchestrator;
use flow_cell::store::{FlowPatch, FlowStore, MemoryFlowStore};

mockall::mock! {
    pub Catalog {}

    #[async_trait]
    impl ProductLookup for Catalog {
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
}

mockall::mock! {
    pub Orders {}

    #[async_trait]
    impl OrderProvisioner for Orders {
        async fn create_order(&self, request: OrderRequest) -> Result<OrderData, BillingError>;
        async fn cancel_order(&self, order_id: Uuid, reason: &str) -> Result<(), BillingError>;
    }
}

mockall::mock! {
    pub Invoices {}

    #[async_trait]
    impl InvoiceIssuer for Invoices {
        async fn create_invoice(&self, request: InvoiceRequest) -> Result<InvoiceData, BillingError>;
        async fn void_invoice(&self, invoice_id: Uuid, reason: &str) -> Result<(), BillingError>;
    }
}

pub fn test_product(category_id: &str, product_id: &str) -> Product {
    Product {
        id: product_id.to_string(),
        category_id: category_id.to_string(),
        name: "Semaglutide".to_string(),
        description: Some("Weekly injection".to_string()),
        price_cents: 4900,
        is_active: true,
        requires_prescription: true,
        display_order: 1,
        durations: vec![
            ProductDuration {
                id: "dur-monthly".to_string(),
                label: "Monthly".to_string(),
                days: 30,
                price_cents: 4900,
            },
            ProductDuration {
                id: "dur-quarterly".to_string(),
                label: "Quarterly".to_string(),
                days: 90,
                price_cents: 12900,
            },
        ],
    }
}

pub fn test_selection(category_id: &str, product_id: &str, duration_id: &str) -> ProductSelection {
    let product = test_product(category_id, product_id);
    let duration = product
        .durations
        .iter()
        .find(|d| d.id == duration_id)
        .cloned()
        .unwrap_or_else(|| ProductDuration {
            id: duration_id.to_string(),
            label: "Monthly".to_string(),
            days: 30,
            price_cents: 4900,
        });

    ProductSelection { product, duration }
}

/// Catalog stub that accepts any category, product, and duration.
pub fn permissive_catalog() -> MockCatalog {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_get_product_recommendations()
        .returning(|category_id| Ok(vec![test_product(category_id, "semaglutide")]));
    catalog
        .expect_verify_product_selection()
        .returning(|category_id, product_id, duration_id| {
            Ok(test_selection(category_id, product_id, duration_id))
        });
    catalog
}

pub fn happy_orders() -> MockOrders {
    let mut orders = MockOrders::new();
    orders.expect_create_order().returning(|request| {
        Ok(OrderData {
            order_id: Uuid::new_v4(),
            product_id: request.product_id,
            duration_id: request.duration_id,
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
        })
    });
    orders.expect_cancel_order().returning(|_, _| Ok(()));
    orders
}

pub fn happy_invoices() -> MockInvoices {
    let mut invoices = MockInvoices::new();
    invoices.expect_create_invoice().returning(|request| {
        Ok(InvoiceData {
            invoice_id: Uuid::new_v4(),
            invoice_number: "INV-20260830-1a2b3c4d".to_string(),
            amount_cents: request.amount_cents,
            created_at: Utc::now(),
        })
    });
    invoices.expect_void_invoice().returning(|_, _| Ok(()));
    invoices
}

pub fn initialize_request() -> InitializeFlowRequest {
    InitializeFlowRequest {
        patient_id: Uuid::new_v4(),
        category_id: "weight-mgmt".to_string(),
        product_id: None,
        duration_id: None,
    }
}

pub struct Harness {
    pub store: Arc<MemoryFlowStore>,
    pub feed: Arc<FlowChangeFeed>,
    pub orchestrator: Arc<TelehealthFlowOrchestrator>,
}

pub fn harness(catalog: MockCatalog, orders: MockOrders, invoices: MockInvoices) -> Harness {
    harness_with(catalog, orders, invoices, FlowLifecycleRules::default())
}

pub fn harness_with(
    catalog: MockCatalog,
    orders: MockOrders,
    invoices: MockInvoices,
    rules: FlowLifecycleRules,
) -> Harness {
    let store = Arc::new(MemoryFlowStore::new());
    let feed = Arc::new(FlowChangeFeed::new());

    let orchestrator = Arc::new(TelehealthFlowOrchestrator::new(
        store.clone(),
        Arc::new(catalog),
        Arc::new(orders),
        Arc::new(invoices),
        feed.clone(),
        rules,
    ));

    Harness {
        store,
        feed,
        orchestrator,
    }
}

/// Store wrapper whose next version-guarded write loses to a simulated
/// concurrent writer. The winner's patch, if any, lands on the inner store
/// before the conflict is surfaced.
pub struct ConflictingStore {
    inner: Arc<MemoryFlowStore>,
    conflict_next_update: AtomicBool,
    winner_patch: std::sync::Mutex<Option<FlowPatch>>,
}

impl ConflictingStore {
    pub fn new(inner: Arc<MemoryFlowStore>) -> Self {
        Self {
            inner,
            conflict_next_update: AtomicBool::new(false),
            winner_patch: std::sync::Mutex::new(None),
        }
    }

    pub fn conflict_on_next_update(&self) {
        self.conflict_next_update.store(true, Ordering::SeqCst);
    }

    pub fn conflict_with_winner(&self, patch: FlowPatch) {
        *self.winner_patch.lock().unwrap() = Some(patch);
        self.conflict_next_update.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlowStore for ConflictingStore {
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError> {
        self.inner.fetch_flow(flow_id).await
    }

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError> {
        self.inner.insert_flow(flow).await
    }

    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError> {
        if self.conflict_next_update.swap(false, Ordering::SeqCst) {
            let winner = self.winner_patch.lock().unwrap().take();
            if let Some(winner) = winner {
                self.inner
                    .update_flow(flow_id, winner, expected_version)
                    .await?;
            }
            return Err(StoreError::VersionConflict {
                expected: expected_version,
            });
        }
        self.inner.update_flow(flow_id, patch, expected_version).await
    }

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError> {
        self.inner.list_flows(query).await
    }
}

/// Store wrapper that counts reads, for asserting on refetch paths.
pub struct CountingStore {
    inner: Arc<MemoryFlowStore>,
    fetch_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<MemoryFlowStore>) -> Self {
        Self {
            inner,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlowStore for CountingStore {
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_flow(flow_id).await
    }

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError> {
        self.inner.insert_flow(flow).await
    }

    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError> {
        self.inner.update_flow(flow_id, patch, expected_version).await
    }

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError> {
        self.inner.list_flows(query).await
    }
}
