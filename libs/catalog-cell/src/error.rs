use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {product_id} does not offer duration {duration_id}")]
    DurationNotAvailable {
        product_id: String,
        duration_id: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
