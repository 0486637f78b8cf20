// libs/flow-cell/src/store/memory.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{FlowSearchQuery, TelehealthFlow};
use crate::store::{apply_patch, FlowPatch, FlowStore};

/// In-memory store used by unit and session tests.
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: Arc<RwLock<HashMap<Uuid, TelehealthFlow>>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn fetch_flow(&self, flow_id: Uuid) -> Result<Option<TelehealthFlow>, StoreError> {
        let flows = self.flows.read().await;
        Ok(flows.get(&flow_id).cloned())
    }

    async fn insert_flow(&self, flow: &TelehealthFlow) -> Result<TelehealthFlow, StoreError> {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id, flow.clone());
        Ok(flow.clone())
    }

    async fn update_flow(
        &self,
        flow_id: Uuid,
        patch: FlowPatch,
        expected_version: i64,
    ) -> Result<TelehealthFlow, StoreError> {
        let mut flows = self.flows.write().await;
        let flow = flows.get_mut(&flow_id).ok_or(StoreError::NotFound)?;

        if flow.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
            });
        }

        apply_patch(flow, &patch);
        flow.version = expected_version + 1;

        Ok(flow.clone())
    }

    async fn list_flows(&self, query: &FlowSearchQuery) -> Result<Vec<TelehealthFlow>, StoreError> {
        let flows = self.flows.read().await;

        let mut matching: Vec<TelehealthFlow> = flows
            .values()
            .filter(|flow| {
                query.patient_id.map_or(true, |p| flow.patient_id == p)
                    && query
                        .category_id
                        .as_ref()
                        .map_or(true, |c| &flow.category_id == c)
                    && query.status.map_or(true, |s| flow.current_status == s)
                    && query.created_after.map_or(true, |t| flow.created_at >= t)
                    && query.created_before.map_or(true, |t| flow.created_at <= t)
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let mut matching: Vec<TelehealthFlow> = matching.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit {
            matching.truncate(limit.max(0) as usize);
        }

        Ok(matching)
    }
}
