//! Product catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{DEFAULT_CURRENCY, PaginationParams};

/// A sellable catalog entry. Prices are in minor units (cents).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub average_rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(sku: &str, name: &str, category: &str, price_cents: i64, stock: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            description: String::new(),
            category: category.trim().to_string(),
            price_cents,
            currency: DEFAULT_CURRENCY.to_string(),
            stock,
            image_url: None,
            is_active: true,
            average_rating: 0.0,
            review_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_request(req: &CreateProductRequest) -> Self {
        let mut product = Self::new(
            &req.sku,
            &req.name,
            &req.category,
            req.price_cents,
            req.stock,
        );
        product.description = req.description.clone().unwrap_or_default();
        product.image_url = req.image_url.clone();
        product
    }

    /// Applies the present fields of a partial update.
    pub fn apply(&mut self, req: &UpdateProductRequest) {
        if let Some(name) = &req.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &req.description {
            self.description = description.clone();
        }
        if let Some(category) = &req.category {
            self.category = category.trim().to_string();
        }
        if let Some(price) = req.price_cents {
            self.price_cents = price;
        }
        if let Some(image_url) = &req.image_url {
            self.image_url = Some(image_url.clone());
        }
        if let Some(active) = req.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
    }

    pub fn has_stock_for(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

fn validate_sku(sku: &str) -> Result<(), validator::ValidationError> {
    let valid = !sku.is_empty()
        && sku
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("sku_format"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_sku"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(range(min = 1))]
    pub price_cents: i64,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[validate(length(max = 2048))]
    pub image_url: Option<String>,
}

impl CreateProductRequest {
    pub fn new(sku: &str, name: &str, category: &str, price_cents: i64, stock: i32) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            description: None,
            category: category.to_string(),
            price_cents,
            stock,
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 1))]
    pub price_cents: Option<i64>,
    #[validate(length(max = 2048))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentRequest {
    /// Signed change applied to the current stock
    pub delta: i32,
}

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
    Name,
}

/// Catalog listing filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page.unwrap_or(1), self.per_page.unwrap_or(20))
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns true when the product passes every filter. Used by in-memory
    /// adapters; SQL adapters push the same predicates into the query.
    pub fn matches(&self, product: &Product) -> bool {
        if !product.is_active {
            return false;
        }
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            if !product.name.to_lowercase().contains(&term)
                && !product.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if let Some(category) = self.category_filter() {
            if !product.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price_cents < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price_cents > max) {
            return false;
        }
        true
    }
}
