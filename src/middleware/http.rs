//! HTTP-level middleware (cross-cutting concerns).
//!
//! Responsibility:
//! - Request-Id generation + propagation (X-Request-Id)
//! - Access logging / request tracing (TraceLayer)
//! - Global deadline (a timed-out request drops the in-flight decode)
//!
//! Notes:
//! - Forward-auth calls carry headers only and the body is never read, so there
//!   is no body limit layer (its 413 would be one more status the proxy cannot use).
//! - The proxy only understands 200 / 401, so a request that hits the deadline
//!   or fails inside the stack is answered with 401, never 408 / 5xx.

use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::http::{StatusCode, header::HeaderName};
use tower::timeout::{TimeoutLayer, error::Elapsed};
use tower::{BoxError, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Apply HTTP-level middleware to the given Router.
pub fn apply(router: Router, request_timeout: Duration) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(reject_on_error))
        // Generate a request id if missing, then propagate it to the response.
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http());

    router.layer(layers)
}

async fn reject_on_error(err: BoxError) -> StatusCode {
    let status = StatusCode::UNAUTHORIZED;
    if err.is::<Elapsed>() {
        tracing::warn!(status = status.as_u16(), "request deadline exceeded, token rejected");
    } else {
        tracing::warn!(error = %err, status = status.as_u16(), "request failed in middleware, token rejected");
    }
    status
}
