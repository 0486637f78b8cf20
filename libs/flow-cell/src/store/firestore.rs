// libs/flow-cell/src/store/firestore.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::firestore::{FirestoreClient, PatchOutcome};

use crate::error::StoreError;
use crate::models::{FlowSearchQuery, TelehealthFlow};
use crate::store::{FlowPatch, FlowStore};

const FLOWS_COLLECTION: &str = "telehealth_flows";

/// Firestore-backed flow store. The compare-and-set reads the document,
/// checks the `version` field, then patches under a
/// `currentDocument.updateTime` precondition so a racing writer trips the
/// precondition instead of clobbering.
pub struct FirestoreFlowStore {
    firestore: Arc<FirestoreClient>,
}

impl FirestoreFlowStore {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        Self { firestore }
    }

    fn parse_flow(fields: &Value) -> Result<TelehealthFlow, StoreError> {
        serde_json::from_value(fields.clone())
            .map_err(|e| StoreError::Malformed(format!("Failed to parse flow document: {}", e)))
    }

    fn patch_fields(patch: &FlowPatch, next_version: i64) -> (Value, Vec<String>) {
        let mut fields = serde_json::Map::new();

        if let Some(status) = patch.current_status {
            fields.insert("current_status".to_string(), json!(status));
        }
        if let Some(product_id) = &patch.product_id {
            fields.insert("product_id".to_string(), json!(product_id));
        }
        if let Some(duration_id) = &patch.duration_id {
            fields.insert("duration_id".to_string(), json!(duration_id));
        }
        if let Some(intake) = &patch.intake_form_data {
            fields.insert("intake_form_data".to_string(), intake.clone());
        }
        if let Some(consultation) = &patch.consultation_data {
            fields.insert("consultation_data".to_string(), json!(consultation));
        }
        if let Some(order) = &patch.order_data {
            fields.insert("order_data".to_string(), json!(order));
        }
        if let Some(invoice) = &patch.invoice_data {
            fields.insert("invoice_data".to_string(), json!(invoice));
        }
        if let Some(history) = &patch.status_history {
            fields.insert("status_history".to_string(), json!(history));
        }
        if let Some(updated_at) = patch.updated_at {
            fields.insert("updated_at".to_string(), json!(updated_at.to_rfc3339()));
        }
        fields.insert("version".to_string(), json!(next_version));

        let paths = fields.keys().cloned().collect();
        (Value::Object(fields), paths)
    }
}

#[async_trait]
impl FlowStore for FirestoreFlowStore {
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError> {
        debug!("Fetching flow document {}", flow_id);

        let doc = self
            .firestore
            .get_document(FLOWS_COLLECTION, &flow_id.to_string())
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match doc {
            Some(doc) => Ok(Some(Self::parse_flow(&doc.fields)?)),
            None => Ok(None),
        }
    }

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError> {
        debug!("Creating flow document {}", flow.id);

        let fields = serde_json::to_value(flow)
            .map_err(|e| StoreError::Malformed(format!("Failed to serialize flow: {}", e)))?;

        let doc = self
            .firestore
            .create_document(FLOWS_COLLECTION, &flow.id.to_string(), fields)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Self::parse_flow(&doc.fields)
    }

    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError> {
        debug!(
            "Updating flow document {} at version {}",
            flow_id, expected_version
        );

        let doc = self
            .firestore
            .get_document(FLOWS_COLLECTION, &flow_id.to_string())
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .ok_or(StoreError::NotFound)?;

        let stored_version = doc.fields.get("version").and_then(|v| v.as_i64());
        if stored_version != Some(expected_version) {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
            });
        }

        let (fields, paths) = Self::patch_fields(&patch, expected_version + 1);
        let path_refs: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();

        let outcome = self
            .firestore
            .patch_document(
                FLOWS_COLLECTION,
                &flow_id.to_string(),
                fields,
                &path_refs,
                &doc.update_time,
            )
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match outcome {
            PatchOutcome::Applied(doc) => Self::parse_flow(&doc.fields),
            PatchOutcome::PreconditionFailed => Err(StoreError::VersionConflict {
                expected: expected_version,
            }),
        }
    }

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError> {
        debug!("Querying flow documents with filters: {:?}", query);

        let mut filters = Vec::new();
        if let Some(patient_id) = query.patient_id {
            filters.push(field_filter("patient_id", "EQUAL", json!(patient_id)));
        }
        if let Some(category_id) = &query.category_id {
            filters.push(field_filter("category_id", "EQUAL", json!(category_id)));
        }
        if let Some(status) = query.status {
            filters.push(field_filter("current_status", "EQUAL", json!(status)));
        }
        if let Some(created_after) = query.created_after {
            filters.push(field_filter(
                "created_at",
                "GREATER_THAN_OR_EQUAL",
                json!(created_after.to_rfc3339()),
            ));
        }
        if let Some(created_before) = query.created_before {
            filters.push(field_filter(
                "created_at",
                "LESS_THAN_OR_EQUAL",
                json!(created_before.to_rfc3339()),
            ));
        }

        let mut structured_query = json!({
            "from": [{ "collectionId": FLOWS_COLLECTION }],
            "orderBy": [{ "field": { "fieldPath": "created_at" }, "direction": "DESCENDING" }]
        });
        if !filters.is_empty() {
            structured_query["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": filters }
            });
        }
        if let Some(limit) = query.limit {
            structured_query["limit"] = json!(limit);
        }
        if let Some(offset) = query.offset {
            structured_query["offset"] = json!(offset);
        }

        let documents = self
            .firestore
            .run_query(structured_query)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        documents
            .iter()
            .map(|doc| Self::parse_flow(&doc.fields))
            .collect()
    }
}

fn field_filter(field: &str, op: &str, value: Value) -> Value {
    let firestore_value = match &value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Number(n) if n.is_i64() => json!({ "integerValue": n.to_string() }),
        other => json!({ "stringValue": other.to_string().trim_matches('"') }),
    };

    json!({
        "fieldFilter": {
            "field": { "fieldPath": field },
            "op": op,
            "value": firestore_value
        }
    })
}
