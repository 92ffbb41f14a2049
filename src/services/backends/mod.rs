pub mod faceswap;
pub mod gpt;

use async_trait::async_trait;

use crate::models::job::{FailureKind, MappingPolicy, ProcessingOptions};

/// Failure reported by an external processing backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Backend could not be reached or timed out. Worth retrying.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend validated the request and declined it (e.g. no face detected).
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// Unclassified backend failure.
    #[error("unexpected backend error: {0}")]
    Unexpected(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Unavailable(_) => FailureKind::Unavailable,
            BackendError::Rejected(_) => FailureKind::Rejected,
            BackendError::Unexpected(_) => FailureKind::Unexpected,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }

    /// Classify a transport-level reqwest error.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            BackendError::Unavailable(err.to_string())
        } else {
            BackendError::Unexpected(err.to_string())
        }
    }

    /// Classify a non-success HTTP status from a backend.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        use reqwest::StatusCode;
        let message = format!("{status}: {body}");
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            BackendError::Unavailable(message)
        } else if status.is_client_error() {
            BackendError::Rejected(message)
        } else {
            BackendError::Unexpected(message)
        }
    }
}

/// A source face resolved to bytes, keeping its submission position for
/// ordered mapping policies.
#[derive(Debug, Clone)]
pub struct SourceFace {
    pub position: usize,
    pub person_id: Option<String>,
    pub bytes: Vec<u8>,
}

/// Generative edit backend: takes the original image and the processing
/// options, returns a new image. No partial results.
#[async_trait]
pub trait EditBackend: Send + Sync {
    async fn edit(
        &self,
        image: &[u8],
        options: &ProcessingOptions,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Face-swap backend: composites the given source faces onto persons in the
/// target image according to the mapping policy.
#[async_trait]
pub trait SwapBackend: Send + Sync {
    async fn swap(
        &self,
        target: &[u8],
        faces: &[SourceFace],
        mapping: &MappingPolicy,
    ) -> Result<Vec<u8>, BackendError>;
}
