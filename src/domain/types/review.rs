use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A product review. One per user per product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub rating: i16,
    pub title: String,
    pub body: String,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(product_id: Uuid, user_id: Uuid, author_name: &str, req: &ReviewRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            user_id,
            author_name: author_name.to_string(),
            rating: req.rating,
            title: req.title.trim().to_string(),
            body: req.body.clone().unwrap_or_default(),
            verified_purchase: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, req: &ReviewRequest) {
        self.rating = req.rating;
        self.title = req.title.trim().to_string();
        self.body = req.body.clone().unwrap_or_default();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub body: Option<String>,
}

impl ReviewRequest {
    pub fn new(rating: i16, title: &str) -> Self {
        Self {
            rating,
            title: title.to_string(),
            body: None,
        }
    }
}

/// Average rating rounded to two decimals; zero when there are no reviews.
pub fn average_rating(ratings: &[i16]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let avg = sum as f64 / ratings.len() as f64;
    (avg * 100.0).round() / 100.0
}
