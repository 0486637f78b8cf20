use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, FlowBackend};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub firestore_base_url: String,
    pub firestore_project_id: String,
    pub flow_backend: FlowBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            firestore_base_url: "http://localhost:8080/v1".to_string(),
            firestore_project_id: "test-project".to_string(),
            flow_backend: FlowBackend::Supabase,
        }
    }
}

impl TestConfig {
    /// Point the Supabase side of the config at a wiremock server.
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    /// Point the Firestore side of the config at a wiremock server.
    pub fn with_firestore_url(url: &str) -> Self {
        Self {
            firestore_base_url: url.to_string(),
            flow_backend: FlowBackend::Firestore,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            firestore_base_url: self.firestore_base_url.clone(),
            firestore_project_id: self.firestore_project_id.clone(),
            firestore_api_key: "test-api-key".to_string(),
            flow_backend: self.flow_backend,
            request_timeout_secs: 5,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// JSON fixtures shaped like the rows the backends return.
pub struct MockBackendRows;

impl MockBackendRows {
    pub fn category_row(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "is_active": true,
            "display_order": 1
        })
    }

    pub fn product_row(id: &str, category_id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "category_id": category_id,
            "name": name,
            "description": "Test product",
            "price_cents": 4900,
            "is_active": true,
            "requires_prescription": true,
            "display_order": 1,
            "durations": [
                {
                    "id": "dur-monthly",
                    "label": "Monthly",
                    "days": 30,
                    "price_cents": 4900
                },
                {
                    "id": "dur-quarterly",
                    "label": "Quarterly",
                    "days": 90,
                    "price_cents": 12900
                }
            ]
        })
    }

    pub fn flow_row(id: Uuid, patient_id: Uuid, category_id: &str, status: &str) -> Value {
        let now = Utc::now().to_rfc3339();
        json!({
            "id": id,
            "patient_id": patient_id,
            "category_id": category_id,
            "product_id": null,
            "duration_id": null,
            "current_status": status,
            "status_history": [
                {
                    "status": status,
                    "changed_at": now,
                    "note": null
                }
            ],
            "intake_form_data": null,
            "consultation_data": null,
            "order_data": null,
            "invoice_data": null,
            "version": 1,
            "created_at": now,
            "updated_at": now
        })
    }

    pub fn order_row(flow_id: Uuid, patient_id: Uuid, product_id: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "flow_id": flow_id,
            "patient_id": patient_id,
            "product_id": product_id,
            "amount_cents": 4900,
            "status": "pending",
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn invoice_row(order_id: Uuid, patient_id: Uuid) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "order_id": order_id,
            "patient_id": patient_id,
            "invoice_number": "INV-20260101-deadbeef",
            "amount_cents": 4900,
            "status": "open",
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert_eq!(app_config.flow_backend, FlowBackend::Supabase);
    }

    #[test]
    fn test_flow_row_shape() {
        let row = MockBackendRows::flow_row(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "weight-mgmt",
            "initialized",
        );

        assert_eq!(row["current_status"], "initialized");
        assert_eq!(row["version"], 1);
        assert_eq!(row["status_history"].as_array().unwrap().len(), 1);
    }
}
