use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{Job, JobId, PrintRequest, QuoteRequest, TrackingCode, VendorId};
use super::lifecycle::JobAction;
use super::repository::{JobRepository, NotificationGateway, VendorDirectory};
use super::service::{DispatchError, FulfillmentService};

/// Header carrying the calling vendor's id on vendor-scoped routes.
pub const VENDOR_HEADER: &str = "x-vendor-id";

/// Router builder exposing customer and vendor endpoints.
pub fn fulfillment_router<J, V, N>(service: Arc<FulfillmentService<J, V, N>>) -> Router
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    Router::new()
        .route("/api/v1/jobs", post(create_handler::<J, V, N>))
        .route("/api/v1/quotes", post(quote_handler::<J, V, N>))
        .route("/api/v1/jobs/:job_id", get(job_handler::<J, V, N>))
        .route("/api/v1/jobs/:job_id/retry", post(retry_handler::<J, V, N>))
        .route("/api/v1/tracking/:code", get(tracking_handler::<J, V, N>))
        .route("/api/v1/vendor/jobs", get(vendor_queue_handler::<J, V, N>))
        .route(
            "/api/v1/vendor/jobs/:job_id/accept",
            post(accept_handler::<J, V, N>),
        )
        .route(
            "/api/v1/vendor/jobs/:job_id/reject",
            post(reject_handler::<J, V, N>),
        )
        .route(
            "/api/v1/vendor/jobs/:job_id/start",
            post(start_handler::<J, V, N>),
        )
        .route(
            "/api/v1/vendor/jobs/:job_id/ready",
            post(ready_handler::<J, V, N>),
        )
        .route(
            "/api/v1/vendor/jobs/:job_id/complete",
            post(complete_handler::<J, V, N>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    axum::Json(request): axum::Json<PrintRequest>,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    match off_runtime(move || service.create_job(request)).await {
        Ok(job) => (StatusCode::CREATED, axum::Json(job.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn quote_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    axum::Json(request): axum::Json<QuoteRequest>,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    match off_runtime(move || service.get_quote(&request)).await {
        Ok(matches) => {
            let payload = json!({ "vendors": matches });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn job_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    let Some(job_id) = parse_job_id(&job_id) else {
        return unknown_job(&job_id);
    };
    job_response(off_runtime(move || service.get_job(&job_id)).await)
}

pub(crate) async fn retry_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    let Some(job_id) = parse_job_id(&job_id) else {
        return unknown_job(&job_id);
    };
    job_response(off_runtime(move || service.retry_matching(&job_id)).await)
}

pub(crate) async fn tracking_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(code): Path<String>,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    let code = TrackingCode(code.trim().to_ascii_uppercase());
    job_response(off_runtime(move || service.track(&code)).await)
}

pub(crate) async fn vendor_queue_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    let vendor_id = match calling_vendor(&headers) {
        Ok(vendor_id) => vendor_id,
        Err(response) => return response,
    };
    match off_runtime(move || service.pending_for_vendor(&vendor_id)).await {
        Ok(jobs) => {
            let views: Vec<_> = jobs.iter().map(Job::status_view).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn accept_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    vendor_action(service, &job_id, &headers, JobAction::Accept).await
}

pub(crate) async fn reject_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    vendor_action(service, &job_id, &headers, JobAction::Reject).await
}

pub(crate) async fn start_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    vendor_action(service, &job_id, &headers, JobAction::StartPrinting).await
}

pub(crate) async fn ready_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    vendor_action(service, &job_id, &headers, JobAction::MarkReady).await
}

pub(crate) async fn complete_handler<J, V, N>(
    State(service): State<Arc<FulfillmentService<J, V, N>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    vendor_action(service, &job_id, &headers, JobAction::Complete).await
}

type VendorOperation<J, V, N> =
    fn(&FulfillmentService<J, V, N>, &JobId, &VendorId) -> Result<Job, DispatchError>;

async fn vendor_action<J, V, N>(
    service: Arc<FulfillmentService<J, V, N>>,
    job_id: &str,
    headers: &HeaderMap,
    action: JobAction,
) -> Response
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    let vendor_id = match calling_vendor(headers) {
        Ok(vendor_id) => vendor_id,
        Err(response) => return response,
    };
    let Some(job_id) = parse_job_id(job_id) else {
        return unknown_job(job_id);
    };

    let operation: VendorOperation<J, V, N> = match action {
        JobAction::Accept => FulfillmentService::accept_job,
        JobAction::Reject => FulfillmentService::reject_job,
        JobAction::StartPrinting => FulfillmentService::start_printing,
        JobAction::MarkReady => FulfillmentService::mark_ready,
        JobAction::Complete => FulfillmentService::complete_job,
        JobAction::Match | JobAction::Timeout => {
            let payload = json!({ "error": format!("{action} is not a vendor action") });
            return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
        }
    };
    job_response(off_runtime(move || operation(&service, &job_id, &vendor_id)).await)
}

/// Service calls block on the job lock and the repository, so they run on
/// tokio's blocking pool instead of an async worker.
async fn off_runtime<T, F>(work: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> Result<T, DispatchError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(HandlerError::Dispatch),
        Err(join) => Err(HandlerError::Aborted(join.to_string())),
    }
}

enum HandlerError {
    Dispatch(DispatchError),
    Aborted(String),
}

fn calling_vendor(headers: &HeaderMap) -> Result<VendorId, Response> {
    headers
        .get(VENDOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| VendorId(value.to_string()))
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {VENDOR_HEADER} header") });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })
}

fn parse_job_id(raw: &str) -> Option<JobId> {
    raw.parse().ok()
}

fn unknown_job(raw: &str) -> Response {
    let payload = json!({ "error": format!("job {raw} not found") });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn job_response(result: Result<Job, HandlerError>) -> Response {
    match result {
        Ok(job) => (StatusCode::OK, axum::Json(job.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::JobNotFound(_) | DispatchError::TrackingCodeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DispatchError::Access(_) => StatusCode::FORBIDDEN,
        DispatchError::IllegalTransition { .. } => StatusCode::CONFLICT,
        DispatchError::TrackingCodesExhausted(_)
        | DispatchError::Repository(_)
        | DispatchError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: HandlerError) -> Response {
    let error = match error {
        HandlerError::Dispatch(error) => error,
        HandlerError::Aborted(reason) => {
            tracing::error!(%reason, "request task did not finish");
            let payload = json!({ "error": "request could not be completed" });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response();
        }
    };
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    }
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
