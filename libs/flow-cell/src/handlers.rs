// libs/flow-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::error::FlowError;
use crate::models::{
    CancelFlowRequest, ConsultationApprovalRequest, FlowSearchQuery, InitializeFlowRequest,
    ProductSelectionRequest,
};
use crate::services::orchestrator::TelehealthFlowOrchestrator;

pub struct FlowCellState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<TelehealthFlowOrchestrator>,
}

fn map_flow_error(e: FlowError) -> AppError {
    match e {
        FlowError::NotFound => AppError::NotFound("Flow not found".to_string()),
        FlowError::CategoryNotFound(id) => {
            AppError::NotFound(format!("Category not found: {}", id))
        }
        FlowError::ProductNotFound(id) => AppError::NotFound(format!("Product not found: {}", id)),
        FlowError::InvalidStateTransition { .. } => AppError::Conflict(e.to_string()),
        FlowError::Conflict { .. } => AppError::Conflict(e.to_string()),
        FlowError::SideEffectFailure { .. } => AppError::ExternalService(e.to_string()),
        FlowError::TransportFailure(msg) => AppError::Database(msg),
        FlowError::ValidationError(msg) => AppError::ValidationError(msg),
    }
}

pub async fn initialize_flow(
    State(state): State<Arc<FlowCellState>>,
    Json(request): Json<InitializeFlowRequest>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .initialize_flow(request)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn get_flow(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .get_flow(flow_id)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn select_product(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<ProductSelectionRequest>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .process_product_selection(flow_id, request)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn submit_intake(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
    Json(form_data): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .process_intake_form(flow_id, form_data)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn queue_consultation(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .queue_for_consultation(flow_id)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn review_consultation(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<ConsultationApprovalRequest>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .process_consultation_approval(flow_id, request)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn complete_flow(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .complete_flow(flow_id)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn cancel_flow(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
    Json(request): Json<CancelFlowRequest>,
) -> Result<Json<Value>, AppError> {
    let flow = state
        .orchestrator
        .cancel_flow(flow_id, request)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "flow": flow
    })))
}

pub async fn search_flows(
    State(state): State<Arc<FlowCellState>>,
    Query(query): Query<FlowSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let flows = state
        .orchestrator
        .search_flows(query)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "count": flows.len(),
        "flows": flows
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub patient_id: Option<Uuid>,
}

pub async fn flow_stats(
    State(state): State<Arc<FlowCellState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    let stats = state
        .orchestrator
        .flow_stats(query.patient_id)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "stats": stats
    })))
}

pub async fn flow_lifecycle(
    State(state): State<Arc<FlowCellState>>,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let view = state
        .orchestrator
        .lifecycle_view(flow_id)
        .await
        .map_err(map_flow_error)?;

    Ok(Json(json!({
        "success": true,
        "lifecycle": view
    })))
}
