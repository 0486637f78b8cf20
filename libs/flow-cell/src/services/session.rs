// libs/flow-cell/src/services/session.rs
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use catalog_cell::Product;

use crate::error::FlowError;
use crate::models::{
    ConsultationApprovalRequest, InitializeFlowRequest, ProductSelectionRequest, TelehealthFlow,
};
use crate::services::orchestrator::TelehealthFlowOrchestrator;

#[derive(Debug, Default)]
struct SessionState {
    flow: Option<TelehealthFlow>,
    loading: bool,
    last_error: Option<String>,
}

/// Client-side adapter over the orchestrator. Holds one flow snapshot, kept
/// current by a listener on the change feed, and exposes the transitions as
/// async actions. A failed action keeps the previous snapshot; `loading` is
/// always reset.
pub struct FlowSession {
    orchestrator: Arc<TelehealthFlowOrchestrator>,
    state: Arc<RwLock<SessionState>>,
    listener: Option<JoinHandle<()>>,
}

impl FlowSession {
    pub fn new(orchestrator: Arc<TelehealthFlowOrchestrator>) -> Self {
        Self {
            orchestrator,
            state: Arc::new(RwLock::new(SessionState::default())),
            listener: None,
        }
    }

    /// Load a flow and start mirroring its published changes. Any previous
    /// listener is torn down first, even when the load fails.
    pub async fn attach(&mut self, flow_id: Uuid) -> Result<TelehealthFlow, FlowError> {
        self.detach();
        self.begin().await;

        match self.orchestrator.get_flow(flow_id).await {
            Ok(flow) => {
                self.install(flow.clone()).await;
                self.spawn_listener(flow_id);
                Ok(flow)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Stop mirroring changes. The current snapshot stays readable.
    pub fn detach(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
            debug!("Flow session listener detached");
        }
    }

    pub async fn initialize_flow(
        &mut self,
        request: InitializeFlowRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        self.begin().await;

        match self.orchestrator.initialize_flow(request).await {
            Ok(flow) => {
                let flow_id = flow.id;
                self.install(flow.clone()).await;
                self.spawn_listener(flow_id);
                Ok(flow)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    pub async fn select_product(
        &self,
        request: ProductSelectionRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow_id = self.attached_flow_id().await?;
        self.begin().await;

        let result = self
            .orchestrator
            .process_product_selection(flow_id, request)
            .await;
        self.settle(result).await
    }

    pub async fn submit_intake_form(
        &self,
        form_data: serde_json::Value,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow_id = self.attached_flow_id().await?;
        self.begin().await;

        let result = self.orchestrator.process_intake_form(flow_id, form_data).await;
        self.settle(result).await
    }

    pub async fn approve_consultation(
        &self,
        request: ConsultationApprovalRequest,
    ) -> Result<TelehealthFlow, FlowError> {
        let flow_id = self.attached_flow_id().await?;
        self.begin().await;

        let result = self
            .orchestrator
            .process_consultation_approval(flow_id, request)
            .await;
        self.settle(result).await
    }

    /// Recommendations for the attached flow's category.
    pub async fn get_product_recommendations(&self) -> Result<Vec<Product>, FlowError> {
        let category_id = {
            let state = self.state.read().await;
            state
                .flow
                .as_ref()
                .map(|f| f.category_id.clone())
                .ok_or_else(no_flow_attached)?
        };

        self.begin().await;
        let result = self
            .orchestrator
            .get_product_recommendations(&category_id)
            .await;

        let mut state = self.state.write().await;
        state.loading = false;
        if let Err(e) = &result {
            state.last_error = Some(e.to_string());
        }
        result
    }

    pub async fn flow(&self) -> Option<TelehealthFlow> {
        self.state.read().await.flow.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn is_flow_active(&self) -> bool {
        self.state
            .read()
            .await
            .flow
            .as_ref()
            .map(|f| f.is_active())
            .unwrap_or(false)
    }

    async fn attached_flow_id(&self) -> Result<Uuid, FlowError> {
        self.state
            .read()
            .await
            .flow
            .as_ref()
            .map(|f| f.id)
            .ok_or_else(no_flow_attached)
    }

    async fn begin(&self) {
        let mut state = self.state.write().await;
        state.loading = true;
        state.last_error = None;
    }

    async fn install(&self, flow: TelehealthFlow) {
        let mut state = self.state.write().await;
        state.flow = Some(flow);
        state.loading = false;
    }

    /// Apply an action result to the session state. An error leaves the
    /// previous snapshot in place.
    async fn settle(
        &self,
        result: Result<TelehealthFlow, FlowError>,
    ) -> Result<TelehealthFlow, FlowError> {
        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(flow) => {
                state.flow = Some(flow.clone());
                Ok(flow)
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn fail(&self, error: &FlowError) {
        let mut state = self.state.write().await;
        state.loading = false;
        state.last_error = Some(error.to_string());
    }

    fn spawn_listener(&mut self, flow_id: Uuid) {
        self.detach();

        let orchestrator = Arc::clone(&self.orchestrator);
        let state = Arc::clone(&self.state);

        self.listener = Some(tokio::spawn(async move {
            let mut receiver = orchestrator.feed().subscribe(flow_id).await;

            loop {
                match receiver.recv().await {
                    Ok(flow) => {
                        let mut state = state.write().await;
                        state.flow = Some(flow);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Catch up with a refetch instead of replaying.
                        warn!(
                            "Flow session lagged {} updates on {}, refetching",
                            skipped, flow_id
                        );
                        if let Ok(flow) = orchestrator.get_flow(flow_id).await {
                            let mut state = state.write().await;
                            state.flow = Some(flow);
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Flow channel {} closed, listener stopping", flow_id);
                        break;
                    }
                }
            }
        }));
    }
}

impl Drop for FlowSession {
    fn drop(&mut self) {
        self.detach();
    }
}

fn no_flow_attached() -> FlowError {
    FlowError::ValidationError("No flow attached to this session".to_string())
}
