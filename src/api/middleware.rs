//! API Middleware
//!
//! Builds the per-request command context and logs requests.

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::CommandContext;

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";
pub const TRANSACTION_ID_HEADER: &str = "X-Transaction-Id";
pub const TIMEOUT_HEADER: &str = "X-Request-Timeout-Ms";

fn bad_header(header: &str, error_code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": format!("Invalid {header} header"),
            "error_code": error_code
        })),
    )
        .into_response()
}

/// Parse the context headers; `Err` carries the name of the bad header
pub fn context_from_headers(headers: &HeaderMap) -> Result<CommandContext, &'static str> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let mut context = CommandContext::new();
    if let Some(correlation_id) = header(CORRELATION_ID_HEADER).and_then(|s| Uuid::parse_str(s).ok()) {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();

    if let Some(value) = header(TRANSACTION_ID_HEADER) {
        let transaction_id = Uuid::parse_str(value).map_err(|_| TRANSACTION_ID_HEADER)?;
        context = context.with_transaction_id(transaction_id);
    }

    if let Some(value) = header(TIMEOUT_HEADER) {
        let millis: u64 = value.parse().map_err(|_| TIMEOUT_HEADER)?;
        context = context.with_timeout(Duration::from_millis(millis));
    }

    Ok(context)
}

/// Attach a [`CommandContext`] to every request
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Result<Response, Response> {
    let context = match context_from_headers(request.headers()) {
        Ok(context) => context,
        Err(TRANSACTION_ID_HEADER) => return Err(bad_header(TRANSACTION_ID_HEADER, "invalid_transaction_id")),
        Err(header) => return Err(bad_header(header, "invalid_header")),
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Request/response logging
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let correlation_id = request
        .extensions()
        .get::<CommandContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
