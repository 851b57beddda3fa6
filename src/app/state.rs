//! Application state management.
//!
//! Handlers reach every use case through [`AppState`], which wires the
//! services to whatever repository and integration implementations the
//! binary (or a test) provides.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    AddressRepository, AnalyticsRepository, CartRepository, EmailSender, ExternalAuthProvider,
    FileStorage, HealthCheck, OrderRepository, PaymentGateway, PaymentRepository,
    ProductRepository, ReviewRepository, UserRepository, WishlistRepository,
};
use crate::infra::auth::{JwtService, PasswordHasher};
use crate::infra::observability::PrometheusHandle;

use super::services::{
    AdminService, AnalyticsService, AuthService, CartService, CatalogService, HealthService,
    OrderService, PaymentService, ProfileService, ReviewService, ShippingService, WishlistService,
};

/// Persistence ports, one per feature.
#[derive(Clone)]
pub struct Repositories {
    pub health: Arc<dyn HealthCheck>,
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub addresses: Arc<dyn AddressRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub wishlists: Arc<dyn WishlistRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
}

impl Repositories {
    /// Uses one backend for every repository, as both the Postgres client
    /// and the in-memory store do.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: HealthCheck
            + UserRepository
            + ProductRepository
            + CartRepository
            + AddressRepository
            + OrderRepository
            + PaymentRepository
            + ReviewRepository
            + WishlistRepository
            + AnalyticsRepository
            + 'static,
    {
        Self {
            health: backend.clone(),
            users: backend.clone(),
            products: backend.clone(),
            carts: backend.clone(),
            addresses: backend.clone(),
            orders: backend.clone(),
            payments: backend.clone(),
            reviews: backend.clone(),
            wishlists: backend.clone(),
            analytics: backend,
        }
    }
}

/// External systems the services talk to.
#[derive(Clone)]
pub struct Integrations {
    pub payments: Arc<dyn PaymentGateway>,
    pub identity: Arc<dyn ExternalAuthProvider>,
    pub storage: Arc<dyn FileStorage>,
    pub email: Arc<dyn EmailSender>,
}

/// Credential settings shared by the auth and profile services.
#[derive(Clone)]
pub struct AuthSettings {
    pub jwt: Arc<JwtService>,
    pub hasher: PasswordHasher,
    pub refresh_ttl: Duration,
    /// Adds `Secure` to the refresh cookie
    pub cookie_secure: bool,
}

/// Shared application state for the Axum web server.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub profile: Arc<ProfileService>,
    pub admin: Arc<AdminService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub shipping: Arc<ShippingService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub reviews: Arc<ReviewService>,
    pub wishlist: Arc<WishlistService>,
    pub analytics: Arc<AnalyticsService>,
    pub health: Arc<HealthService>,
    /// Verifies bearer tokens in the auth extractors
    pub jwt: Arc<JwtService>,
    pub cookie_secure: bool,
    /// Renders `GET /metrics`; `None` when no recorder is installed
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    #[must_use]
    pub fn new(repos: Repositories, integrations: Integrations, settings: AuthSettings) -> Self {
        let cart = Arc::new(CartService::new(
            Arc::clone(&repos.carts),
            Arc::clone(&repos.products),
        ));

        Self {
            auth: Arc::new(AuthService::new(
                Arc::clone(&repos.users),
                Arc::clone(&integrations.identity),
                Arc::clone(&integrations.email),
                Arc::clone(&settings.jwt),
                settings.hasher,
                settings.refresh_ttl,
            )),
            profile: Arc::new(ProfileService::new(
                Arc::clone(&repos.users),
                Arc::clone(&integrations.storage),
                Arc::clone(&integrations.email),
                settings.hasher,
            )),
            admin: Arc::new(AdminService::new(Arc::clone(&repos.users))),
            catalog: Arc::new(CatalogService::new(Arc::clone(&repos.products))),
            shipping: Arc::new(ShippingService::new(Arc::clone(&repos.addresses))),
            orders: Arc::new(OrderService::new(
                Arc::clone(&repos.orders),
                Arc::clone(&repos.carts),
                Arc::clone(&repos.addresses),
                Arc::clone(&repos.users),
                Arc::clone(&integrations.email),
            )),
            payments: Arc::new(PaymentService::new(
                Arc::clone(&repos.payments),
                Arc::clone(&repos.orders),
                Arc::clone(&repos.users),
                Arc::clone(&integrations.payments),
            )),
            reviews: Arc::new(ReviewService::new(
                Arc::clone(&repos.reviews),
                Arc::clone(&repos.products),
                Arc::clone(&repos.orders),
                Arc::clone(&repos.users),
            )),
            wishlist: Arc::new(WishlistService::new(
                Arc::clone(&repos.wishlists),
                Arc::clone(&repos.products),
                Arc::clone(&cart),
            )),
            analytics: Arc::new(AnalyticsService::new(Arc::clone(&repos.analytics))),
            health: Arc::new(HealthService::new(
                Arc::clone(&repos.health),
                Arc::clone(&integrations.payments),
            )),
            cart,
            jwt: settings.jwt,
            cookie_secure: settings.cookie_secure,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: Option<Arc<PrometheusHandle>>) -> Self {
        self.metrics = handle;
        self
    }
}
