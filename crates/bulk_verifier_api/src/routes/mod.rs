//! HTTP routes.
//!
//! - `health`: liveness
//! - `verify`: single-address synchronous verification
//! - `bulk`: submission, status, results, CSV download

pub mod bulk;
pub mod health;
pub mod verify;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::api_handler::ApiError;
use crate::AppState;

/// Build the application router with the shared state applied.
pub fn build_routes(state: Arc<AppState>) -> Router {
    let read_timeout = state.config.read_timeout;
    let write_timeout = state.config.write_timeout;

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/verify", post(verify::verify))
        .route("/v1/bulk", post(bulk::submit))
        .route("/v1/bulk/{id}", get(bulk::status))
        .route("/v1/bulk/{id}/results", get(bulk::results))
        .route("/v1/bulk/{id}/download", get(bulk::download))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(tower_http::cors::Any),
        )
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(write_timeout))
        .layer(RequestBodyTimeoutLayer::new(read_timeout))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
