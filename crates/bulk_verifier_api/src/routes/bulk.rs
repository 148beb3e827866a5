//! Bulk submission, status polling, paginated results, and CSV download.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, instrument};
use verifier_core::Level;

use crate::api_handler::{
    clamp_page, normalize_emails, normalize_level, ApiError, BulkRequest, BulkResponse,
    BulkStatusResponse, ResultsResponse,
};
use crate::csv_codec;
use crate::engine::RunOptions;
use crate::AppState;

/// Query parameters on the submission URL, used by CSV bodies.
#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub concurrency: Option<i64>,
}

/// Pagination parameters for the results endpoint.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

struct Submission {
    emails: Vec<String>,
    level: Level,
    store_results: bool,
    options: RunOptions,
}

/// POST /v1/bulk
///
/// Accepts a JSON payload or a CSV upload, creates the job, and starts its
/// worker pool. Responds 202 before any verification happens.
#[instrument(skip_all, fields(content_length = body.len()))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubmitQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<BulkResponse>), ApiError> {
    let submission = parse_submission(&state, &headers, &query, &body)?;

    if submission.emails.is_empty() {
        return Err(ApiError::EmailsRequired);
    }
    if submission.emails.len() > state.config.max_emails {
        return Err(ApiError::EmailsLimitExceeded);
    }

    let job = state.jobs.create(
        submission.level,
        submission.emails.len(),
        submission.store_results,
    );
    tokio::spawn(state.engine.clone().run_job(
        job.clone(),
        submission.emails,
        submission.options,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkResponse {
            id: job.id.clone(),
            total: job.total,
        }),
    ))
}

fn parse_submission(
    state: &AppState,
    headers: &HeaderMap,
    query: &SubmitQuery,
    body: &[u8],
) -> Result<Submission, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.is_empty() || content_type.starts_with("application/json") {
        let request: BulkRequest =
            serde_json::from_slice(body).map_err(|_| ApiError::InvalidJson)?;
        let level = normalize_level(request.level)?;
        return Ok(Submission {
            emails: normalize_emails(request.emails),
            level,
            store_results: request.store_results.unwrap_or(state.config.store_results),
            options: RunOptions {
                concurrency: request.concurrency.unwrap_or(0).max(0) as usize,
                callback_url: request.callback_url.filter(|url| !url.is_empty()),
                callback_batch: request.callback_batch.unwrap_or(0).max(0) as usize,
            },
        });
    }

    if content_type.starts_with("text/csv") {
        let emails = csv_codec::parse_emails(body)?;
        let level = normalize_level(query.level)?;
        return Ok(Submission {
            emails,
            level,
            store_results: state.config.store_results,
            options: RunOptions {
                concurrency: query.concurrency.unwrap_or(0).max(0) as usize,
                callback_url: None,
                callback_batch: 0,
            },
        });
    }

    Err(ApiError::UnsupportedContentType)
}

/// GET /v1/bulk/{id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BulkStatusResponse>, ApiError> {
    let job = state.jobs.get(&id).ok_or(ApiError::JobNotFound)?;
    Ok(Json(BulkStatusResponse {
        job: job.snapshot(),
    }))
}

/// GET /v1/bulk/{id}/results?offset=&limit=
pub async fn results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let job = state.jobs.get(&id).ok_or(ApiError::JobNotFound)?;
    if !job.store_results {
        return Err(ApiError::ResultsNotStored);
    }
    let (offset, limit) = clamp_page(page.offset, page.limit);
    let (results, total) = job.results_page(offset, limit);
    Ok(Json(ResultsResponse {
        job_id: job.id.clone(),
        offset,
        limit,
        total,
        results,
    }))
}

/// GET /v1/bulk/{id}/download
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state.jobs.get(&id).ok_or(ApiError::JobNotFound)?;
    if !job.store_results {
        return Err(ApiError::ResultsNotStored);
    }

    match csv_codec::render_results(&job.all_results()) {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=results.csv",
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(e) => {
            error!(job_id = %job.id, error = %e, "csv rendering failed");
            Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::{Engine, JobManager, JobStatus, LevelLimiter, MxCache, ProbePacer};
    use crate::routes::build_routes;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower::ServiceExt;
    use verifier_core::{
        Classification, MxHost, MxRecords, Reachable, Result as CoreResult, Syntax, Verdict,
        Verify,
    };

    /// Every syntactically valid address resolves and verifies cleanly.
    struct StubVerifier;

    #[async_trait]
    impl Verify for StubVerifier {
        fn parse_syntax(&self, email: &str) -> Syntax {
            verifier_core::syntax::parse(email)
        }

        fn classify(&self, _syntax: &Syntax) -> Classification {
            Classification::default()
        }

        async fn lookup_mx(&self, domain: &str) -> CoreResult<MxRecords> {
            Ok(MxRecords {
                has_mx_record: true,
                records: vec![MxHost {
                    host: format!("mx.{domain}"),
                    pref: 10,
                }],
            })
        }

        async fn verify(&self, email: &str, _level: Level) -> CoreResult<Verdict> {
            let syntax = verifier_core::syntax::parse(email);
            let valid = syntax.valid;
            Ok(Verdict {
                email: email.to_string(),
                reachable: if valid {
                    Reachable::Unknown
                } else {
                    Reachable::No
                },
                syntax,
                smtp: None,
                suggestion: None,
                disposable: false,
                role_account: false,
                free: false,
                has_mx_records: valid,
            })
        }
    }

    fn test_state(config: AppConfig) -> Arc<AppState> {
        let engine = Arc::new(Engine::new(
            Arc::new(StubVerifier),
            ProbePacer::new(1000.0, 0.0),
            Arc::new(LevelLimiter::new(100, 100)),
            Arc::new(MxCache::new()),
            config.job_concurrency,
        ));
        Arc::new(AppState {
            config: Arc::new(config),
            jobs: JobManager::new(Duration::from_secs(900)),
            engine,
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn wait_for_completion(state: &Arc<AppState>, id: &str) {
        for _ in 0..200 {
            let job = state.jobs.get(id).expect("job exists");
            if job.status() == JobStatus::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never completed");
    }

    #[tokio::test]
    async fn test_submit_poll_results_download() {
        let state = test_state(AppConfig::default());
        let app = build_routes(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "/v1/bulk",
                r#"{"emails": ["a@example.com", "b@example.com"], "level": 1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        let id = body["id"].as_str().unwrap().to_string();

        wait_for_completion(&state, &id).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/bulk/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["job"]["status"], "completed");
        assert_eq!(body["job"]["done"], 2);
        assert_eq!(body["job"]["failed"], 0);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/bulk/{id}/results?offset=0&limit=10"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/bulk/{id}/download"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/csv"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().starts_with("email,reachable"));
    }

    #[tokio::test]
    async fn test_submit_csv_body() {
        let state = test_state(AppConfig::default());
        let app = build_routes(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/bulk?level=1&concurrency=2")
                    .header("content-type", "text/csv")
                    .body(Body::from(
                        "email\na@example.com\nb@example.com\nc@example.com\n",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn test_submit_validation_errors() {
        let state = test_state(AppConfig {
            max_emails: 2,
            ..AppConfig::default()
        });
        let app = build_routes(state);

        let response = app
            .clone()
            .oneshot(json_request("/v1/bulk", r#"{"emails": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "emails_required");

        let response = app
            .clone()
            .oneshot(json_request(
                "/v1/bulk",
                r#"{"emails": ["  ", "\t"], "level": 1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["error"], "emails_required");

        let response = app
            .clone()
            .oneshot(json_request(
                "/v1/bulk",
                r#"{"emails": ["a@x.c", "b@x.c", "c@x.c"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await["error"],
            "emails_limit_exceeded"
        );

        let response = app
            .clone()
            .oneshot(json_request(
                "/v1/bulk",
                r#"{"emails": ["a@x.c"], "level": 9}"#,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["error"], "invalid_level");

        let response = app
            .clone()
            .oneshot(json_request("/v1/bulk", "{not json"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["error"], "invalid_json");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/bulk")
                    .header("content-type", "application/xml")
                    .body(Body::from("<emails/>"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await["error"],
            "unsupported_content_type"
        );
    }

    #[tokio::test]
    async fn test_unknown_job_and_unstored_results() {
        let state = test_state(AppConfig::default());
        let app = build_routes(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/bulk/deadbeef")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "job_not_found");

        // A job that does not retain results answers 410 on both readers.
        let job = state.jobs.create(Level::Mx, 1, false);
        for path in ["results", "download"] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/v1/bulk/{}/{path}", job.id))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::GONE);
            assert_eq!(body_json(response).await["error"], "results_not_stored");
        }
    }

    #[tokio::test]
    async fn test_fallbacks_and_single_verify() {
        let state = test_state(AppConfig::default());
        let app = build_routes(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/verify")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "method_not_allowed");

        let response = app
            .clone()
            .oneshot(json_request("/v1/verify", r#"{"email": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "email_required");

        let response = app
            .clone()
            .oneshot(json_request(
                "/v1/verify",
                r#"{"email": "a@example.com", "level": 1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["email"], "a@example.com");
        assert_eq!(body["reachable"], "unknown");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));
    }
}
