// libs/flow-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::StoreError;
use crate::models::{FlowSearchQuery, TelehealthFlow};
use crate::store::{FlowPatch, FlowStore};

const FLOWS_TABLE: &str = "/rest/v1/telehealth_flows";

/// PostgREST-backed flow store. The compare-and-set is a PATCH filtered on
/// both `id` and `version`; an empty representation means another writer won.
pub struct SupabaseFlowStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseFlowStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_flow(row: &Value) -> Result<TelehealthFlow, StoreError> {
        serde_json::from_value(row.clone())
            .map_err(|e| StoreError::Malformed(format!("Failed to parse flow row: {}", e)))
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn patch_body(patch: &FlowPatch, next_version: i64) -> Value {
        let mut body = serde_json::Map::new();

        if let Some(status) = patch.current_status {
            body.insert("current_status".to_string(), json!(status));
        }
        if let Some(product_id) = &patch.product_id {
            body.insert("product_id".to_string(), json!(product_id));
        }
        if let Some(duration_id) = &patch.duration_id {
            body.insert("duration_id".to_string(), json!(duration_id));
        }
        if let Some(intake) = &patch.intake_form_data {
            body.insert("intake_form_data".to_string(), intake.clone());
        }
        if let Some(consultation) = &patch.consultation_data {
            body.insert("consultation_data".to_string(), json!(consultation));
        }
        if let Some(order) = &patch.order_data {
            body.insert("order_data".to_string(), json!(order));
        }
        if let Some(invoice) = &patch.invoice_data {
            body.insert("invoice_data".to_string(), json!(invoice));
        }
        if let Some(history) = &patch.status_history {
            body.insert("status_history".to_string(), json!(history));
        }
        if let Some(updated_at) = patch.updated_at {
            body.insert("updated_at".to_string(), json!(updated_at.to_rfc3339()));
        }
        body.insert("version".to_string(), json!(next_version));

        Value::Object(body)
    }
}

#[async_trait]
impl FlowStore for SupabaseFlowStore {
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError> {
        debug!("Fetching flow {}", flow_id);

        let path = format!("{}?id=eq.{}", FLOWS_TABLE, flow_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match result.first() {
            Some(row) => Ok(Some(Self::parse_flow(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError> {
        debug!("Inserting flow {}", flow.id);

        let body = serde_json::to_value(flow)
            .map_err(|e| StoreError::Malformed(format!("Failed to serialize flow: {}", e)))?;

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                FLOWS_TABLE,
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match result.first() {
            Some(row) => Self::parse_flow(row),
            None => Err(StoreError::Transport(
                "Insert returned no representation".to_string(),
            )),
        }
    }

    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError> {
        debug!("Updating flow {} at version {}", flow_id, expected_version);

        let path = format!(
            "{}?id=eq.{}&version=eq.{}",
            FLOWS_TABLE, flow_id, expected_version
        );
        let body = Self::patch_body(&patch, expected_version + 1);

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(body),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if let Some(row) = result.first() {
            return Self::parse_flow(row);
        }

        // Empty representation: either the flow is gone or another writer
        // bumped the version first.
        match self.fetch_flow(flow_id).await? {
            Some(_) => Err(StoreError::VersionConflict {
                expected: expected_version,
            }),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError> {
        debug!("Listing flows with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(category_id) = &query.category_id {
            query_parts.push(format!("category_id=eq.{}", category_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("current_status=eq.{}", status));
        }
        if let Some(created_after) = query.created_after {
            let date_str = created_after.to_rfc3339();
            query_parts.push(format!("created_at=gte.{}", urlencoding::encode(&date_str)));
        }
        if let Some(created_before) = query.created_before {
            let date_str = created_before.to_rfc3339();
            query_parts.push(format!("created_at=lte.{}", urlencoding::encode(&date_str)));
        }

        query_parts.push("order=created_at.desc".to_string());
        if let Some(limit) = query.limit {
            query_parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset));
        }

        let path = format!("{}?{}", FLOWS_TABLE, query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        result.iter().map(Self::parse_flow).collect()
    }
}
