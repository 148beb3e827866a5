//! Shared API types and error handling.
//!
//! Every error leaves the service as `{"error": "<code>"}` with a
//! machine-readable code, so clients can branch without parsing prose.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use verifier_core::Level;

use crate::engine::{EmailResult, JobSnapshot};

/// Wire shape of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// API errors, one variant per wire error code.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    MethodNotAllowed,
    InvalidJson,
    InvalidCsv,
    UnsupportedContentType,
    EmailRequired,
    InvalidLevel,
    EmailsRequired,
    EmailsLimitExceeded,
    JobNotFound,
    ResultsNotStored,
    NotFound,
    /// Single-address verification failed; the message is the code.
    Verification(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::JobNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ResultsNotStored => StatusCode::GONE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::InvalidJson => "invalid_json",
            ApiError::InvalidCsv => "invalid_csv",
            ApiError::UnsupportedContentType => "unsupported_content_type",
            ApiError::EmailRequired => "email_required",
            ApiError::InvalidLevel => "invalid_level",
            ApiError::EmailsRequired => "emails_required",
            ApiError::EmailsLimitExceeded => "emails_limit_exceeded",
            ApiError::JobNotFound => "job_not_found",
            ApiError::ResultsNotStored => "results_not_stored",
            ApiError::NotFound => "not_found",
            ApiError::Verification(message) => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Body of `POST /v1/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub level: Option<i64>,
}

/// JSON body of `POST /v1/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub concurrency: Option<i64>,
    #[serde(default)]
    pub store_results: Option<bool>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub callback_batch: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub id: String,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct BulkStatusResponse {
    pub job: JobSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub job_id: String,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub results: Vec<EmailResult>,
}

/// Resolve a requested level: absent or 0 defaults to level 1, anything
/// other than 1 or 2 is rejected.
pub fn normalize_level(level: Option<i64>) -> Result<Level, ApiError> {
    match level.unwrap_or(0) {
        0 | 1 => Ok(Level::Mx),
        2 => Ok(Level::Smtp),
        _ => Err(ApiError::InvalidLevel),
    }
}

/// Trim addresses and discard empties, preserving order.
pub fn normalize_emails(emails: Vec<String>) -> Vec<String> {
    emails
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

const DEFAULT_PAGE_LIMIT: usize = 1000;
const MAX_PAGE_LIMIT: usize = 5000;

/// Clamp pagination parameters: offset >= 0, limit in [0, 5000] with a
/// default of 1000.
pub fn clamp_page(offset: Option<i64>, limit: Option<i64>) -> (usize, usize) {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let limit = match limit {
        Some(l) if l >= 0 => (l as usize).min(MAX_PAGE_LIMIT),
        Some(_) => DEFAULT_PAGE_LIMIT,
        None => DEFAULT_PAGE_LIMIT,
    };
    (offset, limit)
}
