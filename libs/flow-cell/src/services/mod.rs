pub mod feed;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
