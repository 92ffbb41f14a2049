use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::job::{MappingPolicy, SwapStrategy};
use crate::services::backends::{BackendError, SourceFace, SwapBackend};

/// Client for the face-swap engine's HTTP API.
///
/// The engine extracts faces from the target image, matches each source face
/// to a person per the requested mapping, and returns the composited image.
/// Images travel base64-encoded in JSON both ways.
pub struct SwapEngineClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct SwapRequest {
    target_image: String,
    faces: Vec<SwapFace>,
    mapping: SwapMapping,
}

#[derive(Serialize)]
struct SwapFace {
    position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    person_id: Option<String>,
    image: String,
}

#[derive(Serialize)]
struct SwapMapping {
    strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<Vec<u32>>,
}

#[derive(Deserialize)]
struct SwapResponse {
    image: String,
}

impl SwapEngineClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn mapping_payload(mapping: &MappingPolicy) -> SwapMapping {
        match mapping {
            MappingPolicy::Strategy(SwapStrategy::Similarity) => SwapMapping {
                strategy: "similarity",
                indices: None,
            },
            MappingPolicy::Strategy(SwapStrategy::LeftToRight) => SwapMapping {
                strategy: "left_to_right",
                indices: None,
            },
            MappingPolicy::Indices(indices) => SwapMapping {
                strategy: "explicit",
                indices: Some(indices.clone()),
            },
        }
    }
}

#[async_trait]
impl SwapBackend for SwapEngineClient {
    async fn swap(
        &self,
        target: &[u8],
        faces: &[SourceFace],
        mapping: &MappingPolicy,
    ) -> Result<Vec<u8>, BackendError> {
        let b64 = base64::engine::general_purpose::STANDARD;

        let request = SwapRequest {
            target_image: b64.encode(target),
            faces: faces
                .iter()
                .map(|face| SwapFace {
                    position: face.position,
                    person_id: face.person_id.clone(),
                    image: b64.encode(&face.bytes),
                })
                .collect(),
            mapping: Self::mapping_payload(mapping),
        };

        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let parsed: SwapResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Unexpected(format!("malformed swap response: {e}")))?;

        b64.decode(&parsed.image)
            .map_err(|e| BackendError::Unexpected(format!("invalid base64 image payload: {e}")))
    }
}
