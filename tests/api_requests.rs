//! End-to-end request flows through the full router.

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::api::create_router;
use storefront_api::app::AppState;
use storefront_api::domain::{
    AddressRequest, AuthResponse, CartDto, CreateProductRequest, Order, OrderStatus,
    PaymentEvent, PaymentIntentResponse, Product, RegisterRequest, Role, User, UserDto,
};
use storefront_api::test_utils::{MockBackends, MockPaymentGateway, bearer_for, test_state};

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    backends: MockBackends,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// Raw refresh token from the `Set-Cookie` header.
    fn refresh_cookie(&self) -> Option<String> {
        let cookie = self.headers.get(header::SET_COOKIE)?.to_str().ok()?;
        let value = cookie.split(';').next()?.strip_prefix("refresh_token=")?;
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl TestApp {
    fn new() -> Self {
        let backends = MockBackends::new();
        let state = Arc::new(test_state(&backends));
        Self {
            router: create_router(Arc::clone(&state)),
            state,
            backends,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse { status, headers, body }
    }

    fn admin_token(&self) -> String {
        let admin = self
            .backends
            .store
            .seed_user(User::new("admin@shop.io", "Admin", None).with_role(Role::Admin));
        bearer_for(&self.state, &admin)
    }

    async fn register(&self, email: &str) -> (AuthResponse, String) {
        let response = self
            .send(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                &RegisterRequest::new(email, "Password123", "Shopper"),
            ))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        let cookie = response.refresh_cookie().expect("refresh cookie is set");
        (response.json(), cookie)
    }
}

fn json_request<T: Serialize>(method: &str, uri: &str, token: Option<&str>, body: &T) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::empty()).unwrap()
}

fn cookie_request(uri: &str, refresh_token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("refresh_token={refresh_token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_token_lifecycle_flow() {
    let app = TestApp::new();

    // 1. Register: access token in the body, refresh token in an HttpOnly cookie
    let (auth, first_refresh) = app.register("Ann@Example.com").await;
    assert_eq!(auth.token_type, "Bearer");
    assert_eq!(auth.user.email, "ann@example.com");
    let bearer = format!("Bearer {}", auth.access_token);

    // 2. The access token works
    let me = app.send(empty_request("GET", "/api/v1/auth/me", Some(&bearer))).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json::<UserDto>().id, auth.user.id);

    // 3. Refresh rotates the cookie
    let refreshed = app.send(cookie_request("/api/v1/auth/refresh", &first_refresh)).await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let second_refresh = refreshed.refresh_cookie().expect("rotated cookie");
    assert_ne!(second_refresh, first_refresh);

    // 4. Replaying the old token is reuse: everything is revoked
    let replay = app.send(cookie_request("/api/v1/auth/refresh", &first_refresh)).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.refresh_cookie(), None);

    let after_reuse = app.send(cookie_request("/api/v1/auth/refresh", &second_refresh)).await;
    assert_eq!(after_reuse.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_accepts_body_fallback_and_logout_revokes() {
    let app = TestApp::new();
    let (auth, refresh) = app.register("bob@example.com").await;

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/auth/refresh",
            None,
            &serde_json::json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let current = response.refresh_cookie().unwrap();

    let logout = app.send(cookie_request("/api/v1/auth/logout", &current)).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let cleared = logout.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    assert!(
        app.backends
            .store
            .refresh_tokens_for(auth.user.id)
            .iter()
            .all(|t| t.revoked_at.is_some())
    );

    let after_logout = app.send(cookie_request("/api/v1/auth/refresh", &current)).await;
    assert_eq!(after_logout.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_refresh_token_is_unauthorized() {
    let app = TestApp::new();
    let response = app.send(empty_request("POST", "/api/v1/auth/refresh", None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_shopping_flow_from_cart_to_paid_order() {
    let app = TestApp::new();
    let admin = app.admin_token();

    // 1. Admin lists a product
    let created = app
        .send(json_request(
            "POST",
            "/api/v1/products",
            Some(&admin),
            &CreateProductRequest::new("MUG-01", "Camp Mug", "kitchen", 1500, 10),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let product: Product = created.json();

    // 2. Shopper fills the cart
    let (auth, _) = app.register("shopper@example.com").await;
    let bearer = format!("Bearer {}", auth.access_token);

    let cart = app
        .send(json_request(
            "POST",
            "/api/v1/cart/items",
            Some(&bearer),
            &serde_json::json!({ "product_id": product.id, "quantity": 2 }),
        ))
        .await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.json::<CartDto>().subtotal_cents, 3000);

    // 3. Address and checkout
    let address = app
        .send(json_request(
            "POST",
            "/api/v1/addresses",
            Some(&bearer),
            &AddressRequest::new("Ann Shopper", "1 Main St", "Springfield", "12345", "US"),
        ))
        .await;
    assert_eq!(address.status, StatusCode::CREATED);
    let address_id = address.json::<serde_json::Value>()["id"]
        .as_str()
        .unwrap()
        .parse::<Uuid>()
        .unwrap();

    let checkout = app
        .send(json_request(
            "POST",
            "/api/v1/orders/checkout",
            Some(&bearer),
            &serde_json::json!({ "shipping_address_id": address_id }),
        ))
        .await;
    assert_eq!(checkout.status, StatusCode::CREATED);
    let order: Order = checkout.json();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal_cents, 3000);
    assert_eq!(order.shipping_cents, 599);
    assert_eq!(order.total_cents, 3599);
    assert_eq!(app.backends.store.product(product.id).unwrap().stock, 8);

    let empty_cart = app.send(empty_request("GET", "/api/v1/cart", Some(&bearer))).await;
    assert!(empty_cart.json::<CartDto>().items.is_empty());

    // 4. Payment intent, created once
    let uri = format!("/api/v1/orders/{}/payment", order.id);
    let intent = app.send(empty_request("POST", &uri, Some(&bearer))).await;
    assert_eq!(intent.status, StatusCode::OK);
    let intent: PaymentIntentResponse = intent.json();
    assert_eq!(intent.amount_cents, 3599);

    let again = app.send(empty_request("POST", &uri, Some(&bearer))).await;
    assert_eq!(again.json::<PaymentIntentResponse>().payment_id, intent.payment_id);
    assert_eq!(app.backends.payments.created_intents().len(), 1);

    // 5. Provider confirms the payment
    app.backends.payments.register_event(
        "evt_paid",
        PaymentEvent::Succeeded {
            intent_id: "pi_mock_1".to_string(),
        },
    );
    let webhook = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("stripe-signature", MockPaymentGateway::VALID_SIGNATURE)
        .body(Body::from("evt_paid"))
        .unwrap();
    assert_eq!(app.send(webhook).await.status, StatusCode::OK);

    let paid = app
        .send(empty_request("GET", &format!("/api/v1/orders/{}", order.id), Some(&bearer)))
        .await;
    assert_eq!(paid.json::<Order>().status, OrderStatus::Paid);

    // 6. Paid orders can no longer be cancelled by the shopper
    let cancel = app
        .send(empty_request(
            "POST",
            &format!("/api/v1/orders/{}/cancel", order.id),
            Some(&bearer),
        ))
        .await;
    assert_eq!(cancel.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = TestApp::new();

    let forged = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(app.send(forged).await.status, StatusCode::UNAUTHORIZED);

    let unsigned = empty_request("POST", "/api/v1/payments/webhook", None);
    assert_eq!(app.send(unsigned).await.status, StatusCode::UNAUTHORIZED);
}

fn multipart_request(token: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "XBOUNDARYX";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"avatar\"\r\n",
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/profile/avatar")
        .header(header::AUTHORIZATION, token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_avatar_upload_sniffs_content() {
    let app = TestApp::new();
    let (auth, _) = app.register("pic@example.com").await;
    let bearer = format!("Bearer {}", auth.access_token);

    // Declared as JPEG, actually PNG: the bytes decide
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&[0u8; 32]);
    let uploaded = app.send(multipart_request(&bearer, "image/jpeg", &png)).await;
    assert_eq!(uploaded.status, StatusCode::OK);
    let user: UserDto = uploaded.json();
    let url = user.avatar_url.expect("avatar url is saved");
    assert!(url.ends_with(".png"));
    assert_eq!(
        app.backends.storage.content_type_of(&url).as_deref(),
        Some("image/png")
    );

    // Declared as PNG, actually text
    let rejected = app
        .send(multipart_request(&bearer, "image/png", b"definitely not an image"))
        .await;
    assert_eq!(rejected.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new();
    let (auth, _) = app.register("customer@example.com").await;
    let bearer = format!("Bearer {}", auth.access_token);

    let anonymous = app.send(empty_request("GET", "/api/v1/admin/users", None)).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");

    let customer = app
        .send(empty_request("GET", "/api/v1/admin/users", Some(&bearer)))
        .await;
    assert_eq!(customer.status, StatusCode::FORBIDDEN);

    let admin = app.admin_token();
    let allowed = app
        .send(empty_request("GET", "/api/v1/admin/users", Some(&admin)))
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
}
