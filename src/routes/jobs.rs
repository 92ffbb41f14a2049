use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    CreateFaceSwapRequest, CreateGptEditRequest, CreateJobRequest, ErrorBody, JobCreatedResponse,
    JobStatusResponse, QueueStatusResponse,
};
use crate::models::job::Job;
use crate::services::dispatcher::ValidationError;

/// POST /jobs — person-targeted image processing job (edit + face swap).
pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> Response {
    match state.dispatcher.submit(payload).await {
        Ok(job) => created(&state, &job),
        Err(err) => validation_error(err),
    }
}

/// POST /jobs/gpt-edit — generative edit only.
pub async fn create_gpt_edit_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateGptEditRequest>,
) -> Response {
    match state.dispatcher.submit_gpt_edit(payload).await {
        Ok(job) => created(&state, &job),
        Err(err) => validation_error(err),
    }
}

/// POST /jobs/face-swap — face swap only.
pub async fn create_face_swap_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateFaceSwapRequest>,
) -> Response {
    match state.dispatcher.submit_face_swap(payload).await {
        Ok(job) => created(&state, &job),
        Err(err) => validation_error(err),
    }
}

/// GET /jobs/{job_id} — poll job status, progress, and artifacts.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    // Ids are opaque to clients; a malformed id is simply an unknown one.
    let Ok(job_id) = job_id.parse::<Uuid>() else {
        return not_found();
    };
    match state.registry.get(job_id).await {
        Some(job) => Json(JobStatusResponse::from_job(
            &job,
            state.artifacts.job_url_prefix(job.id),
        ))
        .into_response(),
        None => not_found(),
    }
}

/// GET /jobs/queue/status — registry statistics.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    let counts = state.registry.status_counts().await;
    Json(QueueStatusResponse {
        total: counts.total,
        queued: counts.queued,
        editing: counts.editing,
        edited: counts.edited,
        faceswap: counts.faceswap,
        done: counts.done,
        failed: counts.failed,
    })
}

fn created(state: &AppState, job: &Job) -> Response {
    let body = JobCreatedResponse::from_job(job, state.artifacts.job_url_prefix(job.id));
    (StatusCode::CREATED, Json(body)).into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("not_found", "Job not found")),
    )
        .into_response()
}

fn validation_error(err: ValidationError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(err.code(), err.to_string())),
    )
        .into_response()
}
