pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use error::{FlowError, SideEffectStage, StoreError};
pub use handlers::FlowCellState;
pub use models::*;
pub use router::flow_routes;
pub use services::feed::FlowChangeFeed;
pub use services::lifecycle::{FlowLifecycleRules, FlowLifecycleService};
pub use services::orchestrator::TelehealthFlowOrchestrator;
pub use services::session::FlowSession;
pub use store::{FirestoreFlowStore, FlowPatch, FlowStore, MemoryFlowStore, SupabaseFlowStore};
