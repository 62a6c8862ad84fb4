//! REST endpoints for submitting and controlling jobs.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::{
    JobController, JobDetails, JobFields, JobKind, JobStatus, StateTransition, SubmitRequest,
};

/// Where the generated OpenAPI document is served.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Job control",
        description = "Submit background jobs and halt, resume or stop them."
    ),
    paths(submit_job, halt_job, resume_job, stop_job, job_details),
    components(schemas(
        SubmitRequest,
        ApiResponse,
        ErrorResponse,
        JobDetails,
        JobFields,
        JobKind,
        JobStatus,
        StateTransition
    ))
)]
pub struct ApiDoc;

/// Shared state for job routes.
#[derive(Clone)]
pub struct AppState {
    pub controller: JobController,
}

/// Success body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    #[schema(example = 200)]
    pub code: u16,
    #[serde(rename = "jobID")]
    pub job_id: Uuid,
    #[schema(example = "Success")]
    pub message: String,
    /// Job details for `/details`, an empty object otherwise.
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

/// Failure body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// The JobID as the caller sent it, empty for submissions.
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub error: String,
}

impl ApiResponse {
    fn success(job_id: Uuid, details: serde_json::Value) -> Json<Self> {
        Json(Self {
            code: StatusCode::OK.as_u16(),
            job_id,
            message: "Success".to_string(),
            details,
        })
    }
}

/// Failure body: `{"jobID": ..., "error": ...}` with a status code per error kind.
#[derive(Debug)]
pub struct ApiError {
    job_id: String,
    error: JobError,
}

impl ApiError {
    fn new(job_id: impl Into<String>, error: JobError) -> Self {
        Self {
            job_id: job_id.into(),
            error,
        }
    }

    fn status(&self) -> StatusCode {
        match self.error {
            JobError::Validation(_) | JobError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            JobError::NotFound { .. } => StatusCode::NOT_FOUND,
            JobError::MaxJobsExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            JobError::Unresponsive { .. } | JobError::Details(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.error.to_string(),
            job_id: self.job_id,
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router with job routes, API docs, request IDs and HTTP tracing.
pub fn job_routes(controller: JobController) -> Router {
    let state = AppState { controller };

    Router::new()
        .route("/health", get(health))
        .route("/submit", post(submit_job))
        .route("/halt/{jobID}", get(halt_job))
        .route("/resume/{jobID}", get(resume_job))
        .route("/stop/{jobID}", get(stop_job))
        .route("/details/{jobID}", get(job_details))
        .route("/jobs", get(list_jobs))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger").url(OPENAPI_PATH, ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "job-control",
        "jobs": state.controller.summary().await,
    }))
}

// ── Lifecycle ───────────────────────────────────────────────────────────

/// Validate, register and start a job.
#[utoipa::path(
    post,
    path = "/submit",
    tag = "jobs",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Job submitted and running", body = ApiResponse),
        (status = 400, description = "Invalid job request", body = ErrorResponse),
        (status = 503, description = "Job limit reached", body = ErrorResponse)
    )
)]
async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        debug!(error = %e, "Couldn't parse the job request");
        ApiError::new("", JobError::validation("Invalid Job request format"))
    })?;

    match state.controller.submit(&request).await {
        Ok(job_id) => Ok(ApiResponse::success(job_id, json!({}))),
        Err(e) => {
            warn!(job_type = %request.job_type, error = %e, "Job submission rejected");
            Err(ApiError::new("", e))
        }
    }
}

/// Halt a running job.
#[utoipa::path(
    get,
    path = "/halt/{jobID}",
    tag = "jobs",
    params(("jobID" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Done", body = ApiResponse),
        (status = 400, description = "Invalid JobID or not allowed in the current status", body = ErrorResponse),
        (status = 404, description = "No such job", body = ErrorResponse),
        (status = 500, description = "Job did not acknowledge in time", body = ErrorResponse)
    )
)]
async fn halt_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    control(&raw_id, "Halted job", |id| async move {
        state.controller.halt(id).await
    })
    .await
}

/// Resume a halted job.
#[utoipa::path(
    get,
    path = "/resume/{jobID}",
    tag = "jobs",
    params(("jobID" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Done", body = ApiResponse),
        (status = 400, description = "Invalid JobID or not allowed in the current status", body = ErrorResponse),
        (status = 404, description = "No such job", body = ErrorResponse),
        (status = 500, description = "Job did not acknowledge in time", body = ErrorResponse)
    )
)]
async fn resume_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    control(&raw_id, "Resumed job", |id| async move {
        state.controller.resume(id).await
    })
    .await
}

/// Stop a job and release it.
#[utoipa::path(
    get,
    path = "/stop/{jobID}",
    tag = "jobs",
    params(("jobID" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Done", body = ApiResponse),
        (status = 400, description = "Invalid JobID or not allowed in the current status", body = ErrorResponse),
        (status = 404, description = "No such job", body = ErrorResponse),
        (status = 500, description = "Job did not acknowledge in time", body = ErrorResponse)
    )
)]
async fn stop_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    control(&raw_id, "Stopped job", |id| async move {
        state.controller.stop(id).await
    })
    .await
}

/// Latest published state of a job.
#[utoipa::path(
    get,
    path = "/details/{jobID}",
    tag = "jobs",
    params(("jobID" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Job details under `details`", body = ApiResponse),
        (status = 400, description = "Invalid JobID", body = ErrorResponse),
        (status = 404, description = "No such job", body = ErrorResponse),
        (status = 500, description = "Details could not be rendered", body = ErrorResponse)
    )
)]
async fn job_details(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let id = parse_job_id(&raw_id)?;
    let details = state
        .controller
        .details(id)
        .await
        .map_err(|e| ApiError::new(raw_id.as_str(), e))?;

    Ok(ApiResponse::success(id, details_value(&raw_id, &details)?))
}

fn details_value<T: Serialize>(raw_id: &str, details: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(details).map_err(|e| {
        warn!(job_id = raw_id, error = %e, "Failed to serialize job details");
        ApiError::new(raw_id, JobError::Details(e))
    })
}

async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "jobs": state.controller.list().await }))
}

/// Shared shape of halt/resume/stop: parse, run, log, respond.
async fn control<F, Fut>(raw_id: &str, done: &str, op: F) -> Result<Json<ApiResponse>, ApiError>
where
    F: FnOnce(Uuid) -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    let id = parse_job_id(raw_id)?;
    match op(id).await {
        Ok(()) => {
            info!(job_id = %id, "{done}");
            Ok(ApiResponse::success(id, json!({})))
        }
        Err(e) => {
            warn!(job_id = %id, error = %e, "Job operation failed");
            Err(ApiError::new(raw_id, e))
        }
    }
}

fn parse_job_id(raw_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw_id).map_err(|_| {
        debug!(job_id = raw_id, "Error while parsing UUID from string");
        ApiError::new(raw_id, JobError::validation("Invalid JobID"))
    })
}
