//! Product reviews.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{Caller, validate_request};
use crate::domain::{
    AppError, DatabaseError, OrderRepository, PaginatedResponse, PaginationParams,
    ProductRepository, Review, ReviewRepository, ReviewRequest, UserRepository,
};

pub struct ReviewService {
    reviews: Arc<dyn ReviewRepository>,
    products: Arc<dyn ProductRepository>,
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
}

impl ReviewService {
    #[must_use]
    pub fn new(
        reviews: Arc<dyn ReviewRepository>,
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            reviews,
            products,
            orders,
            users,
        }
    }

    /// One review per customer and product. Reviews from customers who
    /// bought the product are flagged as verified.
    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        request: &ReviewRequest,
    ) -> Result<Review, AppError> {
        validate_request(request)?;

        self.products
            .get_product(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found(format!("product {product_id}")))?;
        let author = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        let mut review = Review::new(product_id, user_id, &author.display_name, request);
        review.verified_purchase = self.orders.has_purchased(user_id, product_id).await?;

        match self.reviews.create_review(&review).await {
            Err(AppError::Database(DatabaseError::Duplicate(_))) => {
                warn!("Second review for the same product");
                Err(AppError::conflict("You have already reviewed this product"))
            }
            other => other,
        }?;
        info!(review_id = %review.id, rating = review.rating, verified = review.verified_purchase, "Review created");
        Ok(review)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        request: &ReviewRequest,
    ) -> Result<Review, AppError> {
        validate_request(request)?;

        let mut review = self.load(review_id).await?;
        if review.user_id != user_id {
            return Err(AppError::Authorization(
                "You can only edit your own reviews".to_string(),
            ));
        }
        review.apply(request);
        self.reviews.update_review(&review).await?;
        Ok(review)
    }

    /// Authors may delete their own reviews; admins may delete any.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn delete(&self, caller: Caller, review_id: Uuid) -> Result<(), AppError> {
        let review = self.load(review_id).await?;
        if review.user_id != caller.id && !caller.is_admin() {
            return Err(AppError::Authorization(
                "You can only delete your own reviews".to_string(),
            ));
        }
        self.reviews.delete_review(review.id).await?;
        info!(review_id = %review.id, by_admin = review.user_id != caller.id, "Review deleted");
        Ok(())
    }

    #[instrument(skip(self, page))]
    pub async fn list_for_product(
        &self,
        product_id: Uuid,
        page: &PaginationParams,
    ) -> Result<PaginatedResponse<Review>, AppError> {
        if self.products.get_product(product_id).await?.is_none() {
            return Err(AppError::not_found(format!("product {product_id}")));
        }
        let page = page.normalized();
        let (reviews, total) = self.reviews.list_reviews(product_id, &page).await?;
        Ok(PaginatedResponse::new(reviews, total, &page))
    }

    async fn load(&self, id: Uuid) -> Result<Review, AppError> {
        self.reviews
            .get_review(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("review {id}")))
    }
}
