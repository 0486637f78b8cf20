use thiserror::Error;

use crate::models::FlowStatus;

/// Which approval side effect failed. The flow status never advances past its
/// pre-transition value when one of these is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectStage {
    OrderCreation,
    InvoiceGeneration,
}

impl std::fmt::Display for SideEffectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SideEffectStage::OrderCreation => write!(f, "order creation"),
            SideEffectStage::InvoiceGeneration => write!(f, "invoice generation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow not found")]
    NotFound,

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Invalid state transition from {current} to {attempted}")]
    InvalidStateTransition {
        current: FlowStatus,
        attempted: FlowStatus,
    },

    #[error("Side effect failed during {stage}: {message}")]
    SideEffectFailure {
        stage: SideEffectStage,
        message: String,
    },

    #[error("Concurrent update conflict at version {expected_version}")]
    Conflict { expected_version: i64 },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Errors at the store seam. Not-found is distinct from transport failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Version conflict: expected {expected}")]
    VersionConflict { expected: i64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<StoreError> for FlowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => FlowError::NotFound,
            StoreError::VersionConflict { expected } => FlowError::Conflict {
                expected_version: expected,
            },
            StoreError::Transport(msg) => FlowError::TransportFailure(msg),
            StoreError::Malformed(msg) => FlowError::TransportFailure(msg),
        }
    }
}
