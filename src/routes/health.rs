use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    pub jobs: JobCounts,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub artifact_store: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
}

/// GET /health — liveness plus artifact-store writability and job counts.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    // The artifact store is the only external dependency touched on every
    // job; a read-only or missing media tree means no job can finish.
    let store_check = match tokio::fs::metadata(state.artifacts.jobs_dir()).await {
        Ok(meta) if meta.is_dir() => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        _ => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    };

    let counts = state.registry.status_counts().await;

    let all_healthy = store_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            artifact_store: store_check,
        },
        jobs: JobCounts {
            total: counts.total,
            queued: counts.queued,
            in_flight: counts.editing + counts.edited + counts.faceswap,
            done: counts.done,
            failed: counts.failed,
        },
    };

    (status_code, Json(response))
}
