//! API module
//!
//! Thin HTTP layer over [`AccountService`].

pub mod middleware;
pub mod routes;

pub use routes::create_router;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::service::AccountService;

/// Build the application router
pub fn build_router(service: AccountService) -> Router {
    // Layers run last-added first: context -> logging -> handler
    let api_router = create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::context_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_router)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
