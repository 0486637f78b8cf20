use std::env;
use tracing::warn;

/// Backend the flow store is persisted on. The orchestrator never branches
/// on this; only store construction in `main` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowBackend {
    Supabase,
    Firestore,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub firestore_base_url: String,
    pub firestore_project_id: String,
    pub firestore_api_key: String,
    pub flow_backend: FlowBackend,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            firestore_base_url: env::var("FIRESTORE_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("FIRESTORE_BASE_URL not set, using default");
                    "https://firestore.googleapis.com/v1".to_string()
                }),
            firestore_project_id: env::var("FIRESTORE_PROJECT_ID")
                .unwrap_or_else(|_| {
                    warn!("FIRESTORE_PROJECT_ID not set, using empty value");
                    String::new()
                }),
            firestore_api_key: env::var("FIRESTORE_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("FIRESTORE_API_KEY not set, using empty value");
                    String::new()
                }),
            flow_backend: match env::var("FLOW_BACKEND").as_deref() {
                Ok("firestore") => FlowBackend::Firestore,
                Ok("supabase") | Err(_) => FlowBackend::Supabase,
                Ok(other) => {
                    warn!("Unknown FLOW_BACKEND '{}', falling back to supabase", other);
                    FlowBackend::Supabase
                }
            },
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        match self.flow_backend {
            FlowBackend::Supabase => {
                !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
            }
            FlowBackend::Firestore => {
                !self.firestore_project_id.is_empty() && !self.firestore_api_key.is_empty()
            }
        }
    }
}
