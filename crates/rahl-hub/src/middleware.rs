//! API middleware — request logging.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Log method, path, status and latency for every request.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} → {} ({:.1}ms)",
        method,
        uri.path(),
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    response
}
