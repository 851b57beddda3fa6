//! Domain traits defining contracts for persistence and external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::AppError;
use super::types::{
    Address, AnalyticsSummary, CartLine, CreatePaymentIntent, DailySales, ExternalIdentity,
    ExternalLoginOutcome, Order, OrderStatus, PaginationParams, Payment, PaymentEvent,
    PaymentIntent, PaymentSettlement, PaymentStatus, Product, ProductQuery, RefreshToken, Review,
    TopProduct, User, WishlistEntry,
};

/// Connectivity check for the primary database.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Accounts, external login links and refresh tokens.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user; a duplicate email yields `DatabaseError::Duplicate`
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Lookup by normalized email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Persist every mutable column of the user
    async fn update_user(&self, user: &User) -> Result<(), AppError>;

    async fn list_users(
        &self,
        search: Option<&str>,
        page: &PaginationParams,
    ) -> Result<(Vec<User>, u64), AppError>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError>;

    async fn find_refresh_token(&self, token_hash: &str)
    -> Result<Option<RefreshToken>, AppError>;

    /// Atomically revoke `current_id` (pointing it at the replacement) and
    /// insert the replacement. Returns false when `current_id` was already
    /// revoked by a concurrent request, in which case nothing is written.
    async fn rotate_refresh_token(
        &self,
        current_id: Uuid,
        replacement: &RefreshToken,
    ) -> Result<bool, AppError>;

    /// Returns true when an active token was revoked
    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError>;

    /// Revoke every active token of the user, returning how many were revoked
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Delete tokens that expired or were revoked before `before`
    async fn purge_refresh_tokens(&self, before: DateTime<Utc>) -> Result<u64, AppError>;

    /// In one transaction: resolve the user linked to `identity` (by
    /// provider subject, then by email, else insert `candidate`), link the
    /// external login if missing, and store a refresh token with the given
    /// hash. A deactivated user is returned without a token and nothing is
    /// written.
    async fn upsert_external_login(
        &self,
        identity: &ExternalIdentity,
        candidate: &User,
        token_hash: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<ExternalLoginOutcome, AppError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// A duplicate SKU yields `DatabaseError::Duplicate`
    async fn create_product(&self, product: &Product) -> Result<(), AppError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError>;

    async fn update_product(&self, product: &Product) -> Result<(), AppError>;

    /// Active products matching the query, plus the total match count
    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64), AppError>;

    async fn list_categories(&self) -> Result<Vec<String>, AppError>;

    /// Apply a signed stock delta; returns the new stock. Fails with
    /// `NotFound` for unknown products and `Validation` when the result
    /// would be negative.
    async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<i32, AppError>;
}

/// One cart per user, keyed by (user, product).
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, AppError>;

    async fn cart_quantity(&self, user_id: Uuid, product_id: Uuid)
    -> Result<Option<i32>, AppError>;

    /// Insert or overwrite the quantity of a line
    async fn set_cart_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), AppError>;

    async fn remove_cart_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError>;

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, AppError>;
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    /// Default address first, then newest first
    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>, AppError>;

    async fn get_address(&self, user_id: Uuid, id: Uuid) -> Result<Option<Address>, AppError>;

    /// In one transaction serialized per user: fail with `Conflict` when the
    /// user already holds `limit` addresses, make the address the default
    /// when it is the user's first, and demote the others when it is the
    /// default. Returns the address as stored.
    async fn insert_address(&self, address: &Address, limit: usize) -> Result<Address, AppError>;

    async fn update_address(&self, address: &Address) -> Result<bool, AppError>;

    /// Deleting the default address promotes the newest remaining one
    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// In one transaction: insert the order and its items, decrement stock
    /// for every item (failing with `Conflict` if any product lacks stock)
    /// and clear the owner's cart.
    async fn place_order(&self, order: &Order) -> Result<(), AppError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;

    /// Newest first; `user_id` restricts to one customer
    async fn list_orders(
        &self,
        user_id: Option<Uuid>,
        status: Option<OrderStatus>,
        page: &PaginationParams,
    ) -> Result<(Vec<Order>, u64), AppError>;

    /// Move the order to `to` only if its current status is one of `from`.
    /// When `restore_stock` is set the item quantities go back to the
    /// products in the same transaction, and cancelling flags a succeeded
    /// payment of the order as `refund_pending` in it too. Returns `None`
    /// when the order does not exist or was not in an allowed state.
    async fn transition_order(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
        restore_stock: bool,
    ) -> Result<Option<Order>, AppError>;

    /// Ids of pending orders created before `created_before`, oldest first
    async fn stale_pending_orders(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;

    /// True when the user has a paid-or-later order containing the product
    async fn has_purchased(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;

    /// Most recent payment of the order
    async fn find_payment_for_order(&self, order_id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn find_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, AppError>;

    async fn update_payment_status(&self, id: Uuid, status: PaymentStatus)
    -> Result<(), AppError>;

    /// In one transaction: move the intent's order from `pending` to `paid`
    /// and mark the payment succeeded. When the order already left
    /// `pending` the payment becomes `refund_pending` instead.
    async fn settle_payment(&self, intent_id: &str) -> Result<PaymentSettlement, AppError>;
}

/// Review writes also refresh the product's rating aggregates.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// A second review by the same user yields `DatabaseError::Duplicate`
    async fn create_review(&self, review: &Review) -> Result<(), AppError>;

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, AppError>;

    async fn update_review(&self, review: &Review) -> Result<(), AppError>;

    async fn delete_review(&self, id: Uuid) -> Result<bool, AppError>;

    /// Newest first
    async fn list_reviews(
        &self,
        product_id: Uuid,
        page: &PaginationParams,
    ) -> Result<(Vec<Review>, u64), AppError>;
}

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    /// Newest first, active products only
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, AppError>;

    /// Returns false when the product was already listed
    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, AppError>;

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid)
    -> Result<bool, AppError>;
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn summary(&self) -> Result<AnalyticsSummary, AppError>;

    async fn top_products(&self, limit: i64) -> Result<Vec<TopProduct>, AppError>;

    /// Paid-or-later orders per UTC day since `since`, oldest first
    async fn sales_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailySales>, AppError>;
}

/// Card payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Stored alongside payments, e.g. `stripe`
    fn provider_name(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), AppError>;

    async fn create_intent(&self, request: &CreatePaymentIntent) -> Result<PaymentIntent, AppError>;

    /// Verify the webhook signature and decode the event. Signature
    /// failures are `AppError::Authentication`.
    fn parse_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, AppError>;
}

/// Validates ID tokens issued by external identity providers.
#[async_trait]
pub trait ExternalAuthProvider: Send + Sync {
    async fn validate(&self, provider: &str, id_token: &str)
    -> Result<ExternalIdentity, AppError>;
}

/// Blob storage for user uploads.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` under `key` and return the public URL
    async fn save(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError>;

    /// Delete a previously returned URL; unknown URLs are ignored
    async fn delete(&self, url: &str) -> Result<(), AppError>;
}

/// Plain-text transactional email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: &str, subject: &str, body: impl Into<String>) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;
}
