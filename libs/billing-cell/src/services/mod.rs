pub mod invoices;
pub mod orders;
