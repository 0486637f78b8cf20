// libs/flow-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{self, FlowCellState};

pub fn flow_routes(state: Arc<FlowCellState>) -> Router {
    Router::new()
        .route("/", post(handlers::initialize_flow))
        .route("/search", get(handlers::search_flows))
        .route("/stats", get(handlers::flow_stats))
        .route("/{flow_id}", get(handlers::get_flow))
        .route("/{flow_id}/product", post(handlers::select_product))
        .route("/{flow_id}/intake", post(handlers::submit_intake))
        .route("/{flow_id}/consultation", post(handlers::queue_consultation))
        .route("/{flow_id}/review", post(handlers::review_consultation))
        .route("/{flow_id}/complete", post(handlers::complete_flow))
        .route("/{flow_id}/cancel", post(handlers::cancel_flow))
        .route("/{flow_id}/lifecycle", get(handlers::flow_lifecycle))
        .with_state(state)
}
