use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
