//! Endpoint-level behavior of the router against in-memory backends.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use storefront_api::api::create_router;
use storefront_api::app::AppState;
use storefront_api::domain::{
    AuthResponse, LoginRequest, Product, RegisterRequest, ReviewRequest, Role, User,
};
use storefront_api::test_utils::{
    MockBackends, MockExternalAuthProvider, bearer_for, test_state,
};

fn setup() -> (Router, Arc<AppState>, MockBackends) {
    let backends = MockBackends::new();
    let state = Arc::new(test_state(&backends));
    (create_router(Arc::clone(&state)), state, backends)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json<T: Serialize>(method: &str, uri: &str, token: Option<&str>, body: &T) -> Request<Body> {
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

async fn register(router: &Router, email: &str) -> String {
    let (status, body) = call(
        router,
        send_json(
            "POST",
            "/api/v1/auth/register",
            None,
            &RegisterRequest::new(email, "Password123", "Shopper"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let auth: AuthResponse = serde_json::from_value(body).unwrap();
    format!("Bearer {}", auth.access_token)
}

fn seed_admin(state: &AppState, backends: &MockBackends) -> (User, String) {
    let admin = backends
        .store
        .seed_user(User::new("root@shop.io", "Root", None).with_role(Role::Admin));
    let token = bearer_for(state, &admin);
    (admin, token)
}

fn seed_product(backends: &MockBackends, sku: &str, price_cents: i64) -> Product {
    backends
        .store
        .seed_product(Product::new(sku, "Trail Lantern", "outdoor", price_cents, 25))
}

// --- Health ---

#[tokio::test]
async fn test_health_endpoints() {
    let (router, _, backends) = setup();

    let (status, body) = call(&router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    assert_eq!(call(&router, get("/health/live", None)).await.0, StatusCode::OK);
    assert_eq!(call(&router, get("/health/ready", None)).await.0, StatusCode::OK);

    backends.payments.set_healthy(false);
    let (status, body) = call(&router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["payment_gateway"], "unhealthy");

    backends.store.set_healthy(false);
    let (status, body) = call(&router, get("/health", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(
        call(&router, get("/health/ready", None)).await.0,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(call(&router, get("/health/live", None)).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let (router, _, _) = setup();
    assert_eq!(call(&router, get("/metrics", None)).await.0, StatusCode::NOT_FOUND);
}

// --- Auth ---

#[tokio::test]
async fn test_register_rejects_duplicates_and_weak_passwords() {
    let (router, _, backends) = setup();
    register(&router, "dup@example.com").await;

    let (status, body) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/register",
            None,
            &RegisterRequest::new("DUP@example.com", "Password123", "Again"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].is_string());

    let (status, body) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/register",
            None,
            &RegisterRequest::new("weak@example.com", "password", "Weak"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");

    // Only the first registration sent a welcome mail
    assert_eq!(backends.email.sent().len(), 1);
}

#[tokio::test]
async fn test_login_errors_do_not_reveal_accounts() {
    let (router, _, _) = setup();
    register(&router, "known@example.com").await;

    let (wrong_status, wrong_body) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/login",
            None,
            &LoginRequest::new("known@example.com", "Password999"),
        ),
    )
    .await;
    let (unknown_status, unknown_body) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/login",
            None,
            &LoginRequest::new("nobody@example.com", "Password123"),
        ),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body["error"]["message"], unknown_body["error"]["message"]);

    let (status, _) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/login",
            None,
            &LoginRequest::new("KNOWN@example.com", "Password123"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_account_cannot_log_in() {
    let (router, state, backends) = setup();
    register(&router, "gone@example.com").await;
    let (_, admin) = seed_admin(&state, &backends);

    let (_, users) = call(&router, get("/api/v1/admin/users?search=gone", Some(&admin))).await;
    let id = users["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            &format!("/api/v1/admin/users/{id}/active"),
            Some(&admin),
            &json!({ "is_active": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (status, _) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/login",
            None,
            &LoginRequest::new("gone@example.com", "Password123"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_external_login_creates_account_once() {
    let (router, _, backends) = setup();
    backends.identity.register(
        "google-token",
        MockExternalAuthProvider::google_identity("sub-42", "oauth@example.com"),
    );
    let request = json!({ "provider": "google", "id_token": "google-token" });

    let (status, first) = call(&router, send_json("POST", "/api/v1/auth/external", None, &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user"]["has_password"], false);

    let (_, second) = call(&router, send_json("POST", "/api/v1/auth/external", None, &request)).await;
    assert_eq!(first["user"]["id"], second["user"]["id"]);
    assert_eq!(backends.store.external_login_count(), 1);

    let bad = json!({ "provider": "google", "id_token": "forged" });
    assert_eq!(
        call(&router, send_json("POST", "/api/v1/auth/external", None, &bad)).await.0,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected() {
    let (router, _, _) = setup();
    let (status, body) = call(&router, get("/api/v1/auth/me", Some("Bearer not.a.jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "authentication_error");
}

// --- Profile ---

#[tokio::test]
async fn test_profile_update_and_password_change() {
    let (router, _, _) = setup();
    let token = register(&router, "me@example.com").await;

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/v1/profile",
            Some(&token),
            &json!({ "display_name": "New Name", "phone": "+15550001111" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "New Name");

    let (status, _) = call(
        &router,
        send_json(
            "PUT",
            "/api/v1/profile/password",
            Some(&token),
            &json!({ "current_password": "WrongPass1", "new_password": "Another123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &router,
        send_json(
            "PUT",
            "/api/v1/profile/password",
            Some(&token),
            &json!({ "current_password": "Password123", "new_password": "Another123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/auth/login",
            None,
            &LoginRequest::new("me@example.com", "Another123"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// --- Catalog ---

#[tokio::test]
async fn test_product_admin_endpoints_require_admin() {
    let (router, state, backends) = setup();
    let customer = register(&router, "c@example.com").await;
    let body = json!({
        "sku": "TENT-2",
        "name": "Two Person Tent",
        "category": "outdoor",
        "price_cents": 19900,
        "stock": 3
    });

    assert_eq!(
        call(&router, send_json("POST", "/api/v1/products", None, &body)).await.0,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        call(&router, send_json("POST", "/api/v1/products", Some(&customer), &body)).await.0,
        StatusCode::FORBIDDEN
    );

    let (_, admin) = seed_admin(&state, &backends);
    let (status, created) = call(&router, send_json("POST", "/api/v1/products", Some(&admin), &body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(&router, send_json("POST", "/api/v1/products", Some(&admin), &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let id = created["id"].as_str().unwrap();
    let (status, adjusted) = call(
        &router,
        send_json(
            "POST",
            &format!("/api/v1/products/{id}/stock"),
            Some(&admin),
            &json!({ "delta": -5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{adjusted}");
}

#[tokio::test]
async fn test_product_listing_and_lookup() {
    let (router, _, backends) = setup();
    let lantern = seed_product(&backends, "LAMP-1", 2500);
    seed_product(&backends, "LAMP-2", 4500);

    let (status, page) = call(&router, get("/api/v1/products?per_page=1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let (status, categories) = call(&router, get("/api/v1/products/categories", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(categories, json!(["outdoor"]));

    let (status, found) = call(&router, get(&format!("/api/v1/products/{}", lantern.id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["sku"], "LAMP-1");

    let missing = uuid::Uuid::new_v4();
    let (status, body) = call(&router, get(&format!("/api/v1/products/{missing}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_product_listing_past_the_last_page_is_empty() {
    let (router, _, backends) = setup();
    seed_product(&backends, "LAMP-1", 2500);

    let (status, page) = call(
        &router,
        get("/api/v1/products?page=50000000&per_page=100", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 50_000_000);
    assert!(page["items"].as_array().unwrap().is_empty());
}

// --- Reviews ---

#[tokio::test]
async fn test_reviews_one_per_customer() {
    let (router, _, backends) = setup();
    let product = seed_product(&backends, "REV-1", 1000);
    let token = register(&router, "critic@example.com").await;
    let uri = format!("/api/v1/products/{}/reviews", product.id);

    let (status, review) = call(
        &router,
        send_json("POST", &uri, Some(&token), &ReviewRequest::new(4, "Bright enough")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["verified_purchase"], false);

    let (status, _) = call(
        &router,
        send_json("POST", &uri, Some(&token), &ReviewRequest::new(5, "Changed my mind")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &router,
        send_json("POST", &uri, Some(&token), &ReviewRequest::new(9, "Off the scale")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, list) = call(&router, get(&uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);

    let other = register(&router, "other@example.com").await;
    let review_uri = format!("/api/v1/reviews/{}", review["id"].as_str().unwrap());
    let (status, _) = call(
        &router,
        send_json("PUT", &review_uri, Some(&other), &ReviewRequest::new(1, "Hijack")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// --- Cart, wishlist and shipping ---

#[tokio::test]
async fn test_cart_rejects_quantities_beyond_stock() {
    let (router, _, backends) = setup();
    let product = seed_product(&backends, "CART-1", 1200);
    let token = register(&router, "cart@example.com").await;

    let (status, _) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/cart/items",
            Some(&token),
            &json!({ "product_id": product.id, "quantity": 26 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cart) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/cart/items",
            Some(&token),
            &json!({ "product_id": product.id, "quantity": 3 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 3);
    assert_eq!(cart["subtotal_cents"], 3600);

    let (status, _) = call(
        &router,
        Request::builder()
            .method("DELETE")
            .uri("/api/v1/cart")
            .header(header::AUTHORIZATION, &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_checkout_with_empty_cart_fails() {
    let (router, _, _) = setup();
    let token = register(&router, "empty@example.com").await;

    let (_, address) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/addresses",
            Some(&token),
            &json!({
                "recipient": "E. Mpty",
                "line1": "2 Side St",
                "city": "Shelbyville",
                "postal_code": "54321",
                "country": "US"
            }),
        ),
    )
    .await;

    let (status, _) = call(
        &router,
        send_json(
            "POST",
            "/api/v1/orders/checkout",
            Some(&token),
            &json!({ "shipping_address_id": address["id"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wishlist_move_to_cart() {
    let (router, _, backends) = setup();
    let product = seed_product(&backends, "WISH-1", 800);
    let token = register(&router, "wish@example.com").await;

    let (status, list) = call(
        &router,
        send_json("POST", "/api/v1/wishlist", Some(&token), &json!({ "product_id": product.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, cart) = call(
        &router,
        send_json(
            "POST",
            &format!("/api/v1/wishlist/{}/move-to-cart", product.id),
            Some(&token),
            &json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 1);

    let (_, list) = call(&router, get("/api/v1/wishlist", Some(&token))).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_shipping_quote() {
    let (router, _, _) = setup();

    let (status, quote) = call(&router, get("/api/v1/shipping/quote?subtotal_cents=4000", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["shipping_cents"], 599);
    assert_eq!(quote["total_cents"], 4599);

    let (_, quote) = call(&router, get("/api/v1/shipping/quote?subtotal_cents=5000", None)).await;
    assert_eq!(quote["shipping_cents"], 0);
}

// --- Orders and admin ---

#[tokio::test]
async fn test_orders_are_private() {
    let (router, _, _) = setup();
    let token = register(&router, "private@example.com").await;

    let missing = uuid::Uuid::new_v4();
    let (status, _) = call(&router, get(&format!("/api/v1/orders/{missing}"), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, page) = call(&router, get("/api/v1/orders", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_admin_cannot_demote_self() {
    let (router, state, backends) = setup();
    let (admin, token) = seed_admin(&state, &backends);

    let (status, _) = call(
        &router,
        send_json(
            "PUT",
            &format!("/api/v1/admin/users/{}/role", admin.id),
            Some(&token),
            &json!({ "role": "customer" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_analytics_summary() {
    let (router, state, backends) = setup();
    seed_product(&backends, "STAT-1", 1000);
    register(&router, "stat@example.com").await;
    let (_, token) = seed_admin(&state, &backends);

    let (status, summary) = call(&router, get("/api/v1/admin/analytics/summary", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_users"], 2);
    assert_eq!(summary["active_products"], 1);
    assert_eq!(summary["revenue_cents"], 0);

    let (status, _) = call(&router, get("/api/v1/admin/analytics/top-products", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&router, get("/api/v1/admin/analytics/sales?days=7", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (router, _, _) = setup();
    let (status, doc) = call(&router, get("/api-docs/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/orders/checkout"].is_object());
}
