//! Domain entities and API data transfer objects.
//!
//! Shared wrappers (pagination, health, error bodies) live here; each
//! feature keeps its entities and request/response shapes in a submodule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;
pub mod review;
pub mod shipping;
pub mod user;
pub mod wishlist;

pub use analytics::{AnalyticsSummary, DailySales, SalesQuery, StatusCount, TopProduct, TopProductsQuery};
pub use cart::{AddCartItemRequest, CartDto, CartItemDto, CartLine, UpdateCartItemRequest, MAX_CART_QUANTITY};
pub use catalog::{
    CreateProductRequest, Product, ProductQuery, ProductSort, StockAdjustmentRequest,
    UpdateProductRequest,
};
pub use order::{
    AddressSnapshot, CheckoutRequest, Order, OrderItem, OrderListQuery, OrderStatus,
    UpdateOrderStatusRequest,
};
pub use payment::{
    CreatePaymentIntent, Payment, PaymentEvent, PaymentIntent, PaymentIntentResponse,
    PaymentSettlement, PaymentStatus,
};
pub use review::{Review, ReviewRequest, average_rating};
pub use shipping::{
    Address, AddressRequest, FLAT_SHIPPING_CENTS, FREE_SHIPPING_THRESHOLD_CENTS,
    MAX_ADDRESSES_PER_USER, ShippingQuote, ShippingQuoteQuery,
};
pub use user::{
    AuthResponse, ChangePasswordRequest, ExternalIdentity, ExternalLoginOutcome,
    ExternalLoginRequest, LoginRequest, RefreshRequest, RefreshToken, RegisterRequest, Role,
    SetActiveRequest, SetRoleRequest, UpdateProfileRequest, User, UserDto, UserListQuery,
    normalize_email,
};
pub use wishlist::{WishlistEntry, WishlistRequest};

/// Currency used for every monetary amount in the store.
pub const DEFAULT_CURRENCY: &str = "usd";

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PaginationParams {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size (1-100, default 20)
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PaginationParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }.normalized()
    }

    /// Clamps page to at least 1 and page size to 1..=100.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Rows to skip. Widened to `i64` so no page number can overflow it.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

/// Paginated response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = u64::from(params.per_page.max(1));
        let total_pages = total.div_ceil(per_page) as u32;
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// Health check status for services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response for the application.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub payment_gateway: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    /// The store can still browse and take carts without the gateway, so a
    /// gateway outage alone only degrades the service.
    pub fn new(database: HealthStatus, payment_gateway: HealthStatus) -> Self {
        let status = match (&database, &payment_gateway) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        Self {
            status,
            database,
            payment_gateway,
            timestamp: Utc::now(),
        }
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub r#type: String,
    pub message: String,
}

/// Body returned when a client exceeds its request quota.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    pub error: ErrorDetail,
    pub retry_after: u64,
}
