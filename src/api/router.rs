//! HTTP routing configuration with rate limiting and OpenAPI documentation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::app::services::MAX_AVATAR_BYTES;
use crate::domain::{ErrorDetail, RateLimitResponse};

use super::handlers::{
    ApiDoc, admin, auth, cart, catalog, health, orders, payments, profile, reviews, shipping,
    wishlist,
};
use super::middleware::track_requests;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for general endpoints
    pub general_rps: u32,
    /// Burst size for general endpoints
    pub general_burst: u32,
    /// Requests per second for credential endpoints
    pub auth_rps: u32,
    pub auth_burst: u32,
    /// Requests per second for health endpoints
    pub health_rps: u32,
    pub health_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general_rps: 10,
            general_burst: 20,
            auth_rps: 2,
            auth_burst: 5,
            health_rps: 100,
            health_burst: 100,
        }
    }
}

/// Everything the router needs besides the application state.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `None` disables rate limiting
    pub rate_limit: Option<RateLimitConfig>,
    pub upload_dir: PathBuf,
    /// URL prefix the upload directory is served under
    pub public_upload_path: String,
    /// Allowed browser origins; empty means same-origin only
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rate_limit: None,
            upload_dir: PathBuf::from("./uploads"),
            public_upload_path: "/uploads".to_string(),
            cors_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// One per-IP token bucket (keyed by client IP to prevent global DoS).
#[derive(Clone)]
pub struct Bucket {
    limiter: Arc<KeyedLimiter>,
    rps: u32,
}

impl Bucket {
    pub fn new(rps: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(per_second);
        Self {
            limiter: Arc::new(RateLimiter::dashmap(
                Quota::per_second(per_second).allow_burst(burst),
            )),
            rps: per_second.get(),
        }
    }
}

/// Shared rate limiter state
#[derive(Clone)]
pub struct RateLimitState {
    pub general: Bucket,
    pub auth: Bucket,
    pub health: Bucket,
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            general: Bucket::new(config.general_rps, config.general_burst),
            auth: Bucket::new(config.auth_rps, config.auth_burst),
            health: Bucket::new(config.health_rps, config.health_burst),
        }
    }
}

/// Extract client IP from request (X-Forwarded-For, X-Real-IP, or ConnectInfo).
/// Unknown clients share the 0.0.0.0 bucket.
fn client_ip_from_request<B>(request: &Request<B>) -> IpAddr {
    // Client is first in X-Forwarded-For
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());
    if let Some(ip) = real_ip {
        return ip;
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

async fn rate_limit_middleware(
    State(bucket): State<Bucket>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_ip = client_ip_from_request(&request);
    match bucket.limiter.check_key(&client_ip) {
        Ok(_) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Limit", HeaderValue::from(bucket.rps));
            response
        }
        Err(not_until) => {
            let wait_time = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait_time.as_secs().max(1);
            warn!(client_ip = %client_ip, path = %request.uri().path(), "Rate limit exceeded");

            let body = RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded. Please slow down your requests.".to_string(),
                },
                retry_after,
            };

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(bucket.rps));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

fn limited(router: Router<Arc<AppState>>, bucket: Option<&Bucket>) -> Router<Arc<AppState>> {
    match bucket {
        Some(bucket) => router.layer(middleware::from_fn_with_state(
            bucket.clone(),
            rate_limit_middleware,
        )),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

fn api_routes(limits: Option<&RateLimitState>) -> Router<Arc<AppState>> {
    // Credential endpoints get the strict bucket; routes added after the
    // layer call are not wrapped by it.
    let auth_routes = limited(
        Router::new()
            .route("/register", post(auth::register_handler))
            .route("/login", post(auth::login_handler))
            .route("/external", post(auth::external_login_handler))
            .route("/refresh", post(auth::refresh_handler))
            .route("/logout", post(auth::logout_handler)),
        limits.map(|l| &l.auth),
    )
    .route("/me", get(auth::me_handler));

    let profile_routes = Router::new()
        .route(
            "/",
            get(profile::get_profile_handler)
                .put(profile::update_profile_handler)
                .delete(profile::delete_account_handler),
        )
        .route("/password", put(profile::change_password_handler))
        .route(
            "/avatar",
            post(profile::upload_avatar_handler)
                .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024)),
        );

    let product_routes = Router::new()
        .route(
            "/",
            get(catalog::list_products_handler).post(catalog::create_product_handler),
        )
        .route("/categories", get(catalog::list_categories_handler))
        .route(
            "/{id}",
            get(catalog::get_product_handler)
                .put(catalog::update_product_handler)
                .delete(catalog::delete_product_handler),
        )
        .route("/{id}/stock", post(catalog::adjust_stock_handler))
        .route(
            "/{id}/reviews",
            get(reviews::list_reviews_handler).post(reviews::create_review_handler),
        );

    let cart_routes = Router::new()
        .route(
            "/",
            get(cart::get_cart_handler).delete(cart::clear_cart_handler),
        )
        .route("/items", post(cart::add_cart_item_handler))
        .route(
            "/items/{product_id}",
            put(cart::update_cart_item_handler).delete(cart::remove_cart_item_handler),
        );

    let address_routes = Router::new()
        .route(
            "/",
            get(shipping::list_addresses_handler).post(shipping::create_address_handler),
        )
        .route(
            "/{id}",
            put(shipping::update_address_handler).delete(shipping::delete_address_handler),
        )
        .route("/{id}/default", post(shipping::set_default_address_handler));

    let order_routes = Router::new()
        .route("/", get(orders::list_orders_handler))
        .route("/checkout", post(orders::checkout_handler))
        .route("/{id}", get(orders::get_order_handler))
        .route("/{id}/cancel", post(orders::cancel_order_handler))
        .route(
            "/{id}/payment",
            post(payments::create_payment_handler).get(payments::get_payment_handler),
        );

    let wishlist_routes = Router::new()
        .route(
            "/",
            get(wishlist::list_wishlist_handler).post(wishlist::add_wishlist_handler),
        )
        .route("/{product_id}", delete(wishlist::remove_wishlist_handler))
        .route("/{product_id}/move-to-cart", post(wishlist::move_to_cart_handler));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users_handler))
        .route("/users/{id}", get(admin::get_user_handler))
        .route("/users/{id}/role", put(admin::set_role_handler))
        .route("/users/{id}/active", put(admin::set_active_handler))
        .route("/orders", get(admin::admin_list_orders_handler))
        .route("/orders/{id}/status", put(admin::update_order_status_handler))
        .route("/analytics/summary", get(admin::analytics_summary_handler))
        .route("/analytics/top-products", get(admin::top_products_handler))
        .route("/analytics/sales", get(admin::sales_by_day_handler));

    let routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/profile", profile_routes)
        .nest("/products", product_routes)
        .route(
            "/reviews/{id}",
            put(reviews::update_review_handler).delete(reviews::delete_review_handler),
        )
        .nest("/cart", cart_routes)
        .nest("/addresses", address_routes)
        .route("/shipping/quote", get(shipping::shipping_quote_handler))
        .nest("/orders", order_routes)
        .route("/payments/webhook", post(payments::payment_webhook_handler))
        .nest("/wishlist", wishlist_routes)
        .nest("/admin", admin_routes);

    limited(routes, limits.map(|l| &l.general))
}

/// Create router without rate limiting, for tests and embedding.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    create_router_with_config(app_state, &RouterConfig::default())
}

pub fn create_router_with_config(app_state: Arc<AppState>, config: &RouterConfig) -> Router {
    let limits = config.rate_limit.as_ref().map(RateLimitState::new);

    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(middleware::from_fn(track_requests));

    let health_routes = limited(
        Router::new()
            .route("/", get(health::health_check_handler))
            .route("/live", get(health::liveness_handler))
            .route("/ready", get(health::readiness_handler)),
        limits.as_ref().map(|l| &l.health),
    );

    let mut router = Router::new()
        .nest("/api/v1", api_routes(limits.as_ref()))
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics_handler));

    let upload_path = config.public_upload_path.trim_end_matches('/');
    if upload_path.starts_with('/') && upload_path.len() > 1 {
        router = router.nest_service(upload_path, ServeDir::new(&config.upload_dir));
    } else {
        warn!(path = %config.public_upload_path, "Upload path is not servable, uploads are not exposed");
    }

    let router = router
        .layer(middleware)
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    match cors_layer(&config.cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBackends, test_state};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn ok_handler() -> StatusCode {
        StatusCode::OK
    }

    fn limited_app(bucket: Bucket) -> Router {
        Router::new()
            .route("/", get(ok_handler))
            .layer(middleware::from_fn_with_state(bucket, rate_limit_middleware))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.general_rps, 10);
        assert_eq!(config.general_burst, 20);
        assert_eq!(config.auth_rps, 2);
        assert_eq!(config.auth_burst, 5);
        assert_eq!(config.health_rps, 100);
    }

    #[test]
    fn test_zero_quota_falls_back_to_one() {
        let bucket = Bucket::new(0, 0);
        assert_eq!(bucket.rps, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_after_burst() {
        let app = limited_app(Bucket::new(1, 1));

        let first = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("X-RateLimit-Limit").unwrap(), "1");

        let second = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get(header::RETRY_AFTER).is_some());

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let parsed: RateLimitResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error.r#type, "rate_limited");
        assert!(parsed.retry_after >= 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_client() {
        let app = limited_app(Bucket::new(1, 1));
        let from = |ip: &str| {
            Request::builder()
                .uri("/")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(from("10.0.0.1")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(from("10.0.0.2")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.oneshot(from("10.0.0.1")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_client_ip_sources() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip_from_request(&request), "203.0.113.9".parse::<IpAddr>().unwrap());

        let request = Request::builder().header("x-real-ip", " 198.51.100.4 ").body(()).unwrap();
        assert_eq!(client_ip_from_request(&request), "198.51.100.4".parse::<IpAddr>().unwrap());

        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.7:5000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip_from_request(&request), "192.0.2.7".parse::<IpAddr>().unwrap());

        let request = Request::builder().body(()).unwrap();
        assert_eq!(client_ip_from_request(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_cors_layer_requires_valid_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(cors_layer(&["https://shop.example.com".to_string()]).is_some());
    }

    #[tokio::test]
    async fn test_auth_routes_use_strict_bucket() {
        let state = Arc::new(test_state(&MockBackends::new()));
        let config = RouterConfig {
            rate_limit: Some(RateLimitConfig {
                auth_rps: 1,
                auth_burst: 1,
                ..RateLimitConfig::default()
            }),
            ..RouterConfig::default()
        };
        let app = create_router_with_config(state, &config);

        let logout = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/auth/logout")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(
            app.clone().oneshot(logout()).await.unwrap().status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            app.clone().oneshot(logout()).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        // Product browsing is on the general bucket
        let browse = app.oneshot(get_request("/api/v1/products")).await.unwrap();
        assert_eq!(browse.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_swagger_spec_is_served() {
        let app = create_router(Arc::new(test_state(&MockBackends::new())));
        let response = app.oneshot(get_request("/api-docs/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
