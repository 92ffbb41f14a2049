pub mod health;
pub mod jobs;
pub mod metrics;
pub mod upload;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// API router, shared by the server binary and the integration tests.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/gpt-edit", post(jobs::create_gpt_edit_job))
        .route("/jobs/face-swap", post(jobs::create_face_swap_job))
        .route("/jobs/queue/status", get(jobs::queue_status))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/upload", post(upload::upload_image))
        .route("/uploads", get(upload::list_uploads))
        .route("/uploads/{filename}", get(upload::check_file))
        .with_state(state)
}
