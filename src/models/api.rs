use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::job::{FaceRef, Job, JobError, JobStatus, JobType, MappingPolicy};

/// Body of `POST /jobs`.
///
/// `processing_options.type` is deliberately a free string here: unknown
/// values must reach the dispatcher so it can answer with a structured 400
/// instead of a deserialization error.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub image_url: String,
    #[serde(default)]
    pub person_ids: Vec<String>,
    pub processing_options: ProcessingOptionsPayload,
}

#[derive(Debug, Deserialize)]
pub struct ProcessingOptionsPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Body of `POST /jobs/gpt-edit`.
#[derive(Debug, Deserialize)]
pub struct CreateGptEditRequest {
    pub input_image_url: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Body of `POST /jobs/face-swap`.
#[derive(Debug, Deserialize)]
pub struct CreateFaceSwapRequest {
    pub input_image_url: String,
    #[serde(default)]
    pub faces: Vec<FaceRef>,
    #[serde(default)]
    pub mapping: MappingPolicy,
}

/// `201` response after a job is created.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobCreatedResponse {
    pub job_id: Uuid,
    pub mode: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub links: JobLinks,
}

/// Response of `GET /jobs/{job_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub mode: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub artifacts: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub updated_at: DateTime<Utc>,
    pub links: JobLinks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobLinks {
    #[serde(rename = "self")]
    pub self_url: String,
    pub artifacts: String,
}

impl JobLinks {
    /// `artifacts_url` is the job's artifact directory prefix as the artifact
    /// store publishes it, so the link agrees with the configured public base.
    pub fn for_job(id: Uuid, artifacts_url: String) -> Self {
        Self {
            self_url: format!("/jobs/{id}"),
            artifacts: artifacts_url,
        }
    }
}

impl JobCreatedResponse {
    pub fn from_job(job: &Job, artifacts_url: String) -> Self {
        Self {
            job_id: job.id,
            mode: job.job_type,
            status: job.status,
            created_at: job.created_at,
            links: JobLinks::for_job(job.id, artifacts_url),
        }
    }
}

impl JobStatusResponse {
    pub fn from_job(job: &Job, artifacts_url: String) -> Self {
        Self {
            job_id: job.id,
            mode: job.job_type,
            status: job.status,
            progress: job.progress,
            artifacts: job.artifacts.clone(),
            result_url: job.result_url().map(str::to_string),
            error: job.error.clone(),
            updated_at: job.updated_at,
            links: JobLinks::for_job(job.id, artifacts_url),
        }
    }
}

/// Registry statistics returned by `GET /jobs/queue/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub total: usize,
    pub queued: usize,
    pub editing: usize,
    pub edited: usize,
    pub faceswap: usize,
    pub done: usize,
    pub failed: usize,
}

/// Structured error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
