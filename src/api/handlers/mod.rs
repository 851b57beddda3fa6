//! HTTP request handlers with OpenAPI documentation.
//!
//! Handlers are thin: extract, delegate to one service call, and shape the
//! response. Authorization of the route itself happens in the extractors.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod orders;
pub mod payments;
pub mod profile;
pub mod reviews;
pub mod shipping;
pub mod wishlist;

use utoipa::OpenApi;

use crate::domain::{
    AddCartItemRequest, Address, AddressRequest, AddressSnapshot, AnalyticsSummary, AuthResponse,
    CartDto, CartItemDto, ChangePasswordRequest, CheckoutRequest, CreateProductRequest,
    DailySales, ErrorDetail, ErrorResponse, ExternalLoginRequest, HealthResponse, HealthStatus,
    LoginRequest, Order, OrderItem, OrderStatus, PaginatedResponse, PaymentIntentResponse,
    PaymentStatus, Product, ProductSort, RateLimitResponse, RefreshRequest, RegisterRequest,
    Review, ReviewRequest, Role, SetActiveRequest, SetRoleRequest, ShippingQuote, StatusCount,
    StockAdjustmentRequest, TopProduct, UpdateCartItemRequest, UpdateOrderStatusRequest,
    UpdateProductRequest, UpdateProfileRequest, UserDto, WishlistEntry, WishlistRequest,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.4.0",
        description = "Accounts, token authentication, catalog, cart, orders, payments, reviews and wishlists",
        license(
            name = "MIT"
        )
    ),
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::external_login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        profile::get_profile_handler,
        profile::update_profile_handler,
        profile::change_password_handler,
        profile::upload_avatar_handler,
        profile::delete_account_handler,
        catalog::list_products_handler,
        catalog::list_categories_handler,
        catalog::get_product_handler,
        catalog::create_product_handler,
        catalog::update_product_handler,
        catalog::delete_product_handler,
        catalog::adjust_stock_handler,
        reviews::list_reviews_handler,
        reviews::create_review_handler,
        reviews::update_review_handler,
        reviews::delete_review_handler,
        cart::get_cart_handler,
        cart::add_cart_item_handler,
        cart::update_cart_item_handler,
        cart::remove_cart_item_handler,
        cart::clear_cart_handler,
        shipping::list_addresses_handler,
        shipping::create_address_handler,
        shipping::update_address_handler,
        shipping::delete_address_handler,
        shipping::set_default_address_handler,
        shipping::shipping_quote_handler,
        orders::checkout_handler,
        orders::list_orders_handler,
        orders::get_order_handler,
        orders::cancel_order_handler,
        payments::create_payment_handler,
        payments::get_payment_handler,
        payments::payment_webhook_handler,
        wishlist::list_wishlist_handler,
        wishlist::add_wishlist_handler,
        wishlist::remove_wishlist_handler,
        wishlist::move_to_cart_handler,
        admin::list_users_handler,
        admin::get_user_handler,
        admin::set_role_handler,
        admin::set_active_handler,
        admin::admin_list_orders_handler,
        admin::update_order_status_handler,
        admin::analytics_summary_handler,
        admin::top_products_handler,
        admin::sales_by_day_handler,
        health::health_check_handler,
        health::liveness_handler,
        health::readiness_handler,
        health::metrics_handler,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            ExternalLoginRequest,
            RefreshRequest,
            AuthResponse,
            UserDto,
            Role,
            UpdateProfileRequest,
            ChangePasswordRequest,
            SetRoleRequest,
            SetActiveRequest,
            Product,
            ProductSort,
            CreateProductRequest,
            UpdateProductRequest,
            StockAdjustmentRequest,
            Review,
            ReviewRequest,
            CartDto,
            CartItemDto,
            AddCartItemRequest,
            UpdateCartItemRequest,
            Address,
            AddressRequest,
            ShippingQuote,
            Order,
            OrderItem,
            OrderStatus,
            AddressSnapshot,
            CheckoutRequest,
            UpdateOrderStatusRequest,
            PaymentIntentResponse,
            PaymentStatus,
            payments::WebhookAck,
            WishlistEntry,
            WishlistRequest,
            AnalyticsSummary,
            StatusCount,
            TopProduct,
            DailySales,
            PaginatedResponse<Product>,
            PaginatedResponse<Order>,
            PaginatedResponse<Review>,
            PaginatedResponse<UserDto>,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
            RateLimitResponse,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and token refresh"),
        (name = "profile", description = "Self-service account management"),
        (name = "products", description = "Product catalog"),
        (name = "reviews", description = "Product reviews"),
        (name = "cart", description = "Shopping cart"),
        (name = "shipping", description = "Address book and shipping quotes"),
        (name = "orders", description = "Checkout and order history"),
        (name = "payments", description = "Payment intents and webhooks"),
        (name = "wishlist", description = "Saved products"),
        (name = "admin", description = "User and order administration"),
        (name = "analytics", description = "Sales reporting"),
        (name = "health", description = "Health checks and metrics")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_feature() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/api/v1/auth/refresh",
            "/api/v1/profile/avatar",
            "/api/v1/products/{id}/reviews",
            "/api/v1/orders/checkout",
            "/api/v1/payments/webhook",
            "/api/v1/wishlist/{product_id}/move-to-cart",
            "/api/v1/admin/analytics/sales",
            "/health/ready",
            "/metrics",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
