//! Single-address synchronous verification.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::instrument;
use verifier_core::{Level, Verdict};

use crate::api_handler::{normalize_level, ApiError, VerifyRequest};
use crate::AppState;

/// POST /v1/verify
///
/// Verifies one address inline at the requested level. Level-2 requests go
/// through the same pacer and per-level limiter as bulk workers, so a single
/// probe cannot sidestep the process-wide SMTP budget.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Verdict>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::InvalidJson)?;

    let email = request.email.trim().to_string();
    if email.is_empty() {
        return Err(ApiError::EmailRequired);
    }
    let level = normalize_level(request.level)?;

    if level == Level::Smtp {
        state.engine.pacer().acquire().await;
    }
    let _permit = state.engine.limiter().acquire(level).await;

    let verdict = state
        .engine
        .verifier()
        .verify(&email, level)
        .await
        .map_err(|e| ApiError::Verification(e.to_string()))?;
    Ok(Json(verdict))
}
