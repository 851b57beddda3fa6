//! HTTP middleware for API layer.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Request, Response},
    middleware::Next,
};

use crate::infra::observability::HTTP_REQUESTS_TOTAL;

/// Counts every response by method, route template and status.
///
/// The route template (`/api/v1/orders/{id}`) is used instead of the raw
/// path to keep label cardinality bounded.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}
