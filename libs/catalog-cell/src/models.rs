// libs/catalog-cell/src/models.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub is_active: bool,
    pub requires_prescription: bool,
    pub display_order: i32,
    #[serde(default)]
    pub durations: Vec<ProductDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDuration {
    pub id: String,
    pub label: String,
    pub days: i32,
    pub price_cents: i64,
}

/// A verified product/duration pair, the unit the billing side prices from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSelection {
    pub product: Product,
    pub duration: ProductDuration,
}

impl ProductSelection {
    /// Duration pricing wins over the product's base price.
    pub fn amount_cents(&self) -> i64 {
        if self.duration.price_cents > 0 {
            self.duration.price_cents
        } else {
            self.product.price_cents
        }
    }
}
