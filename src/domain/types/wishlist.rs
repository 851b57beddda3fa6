use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Product;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WishlistEntry {
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WishlistRequest {
    pub product_id: Uuid,
}
