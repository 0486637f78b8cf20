pub mod error;
pub mod models;
pub mod services;

pub use error::BillingError;
pub use models::*;
pub use services::invoices::{InvoiceIssuer, InvoiceService};
pub use services::orders::{OrderProvisioner, OrderService};
