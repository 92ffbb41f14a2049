use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::job::ProcessingOptions;
use crate::services::backends::{BackendError, EditBackend};

/// Instruction appended to every edit prompt so the generative model leaves
/// identified persons' faces untouched for the face-swap stage.
const FACE_PRESERVATION_SUFFIX: &str = " Preserve the original pixels of the subjects' faces, \
skin, eyes, hair, contours, and expression exactly as they are, with no retouching. \
Naturally generate the clothing and body, filling in any missing parts.";

/// Client for the OpenAI images-edit endpoint (`gpt-image-1`).
pub struct GptEditClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ImagesEditResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: String,
}

impl GptEditClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Render processing options into the prompt sent to the model.
    fn render_prompt(options: &ProcessingOptions) -> String {
        let base = match options {
            ProcessingOptions::Color { color } => {
                format!("Transform into a group photo with {color} background color.")
            }
            ProcessingOptions::Prompt { prompt } => prompt.clone(),
        };
        format!("{base}{FACE_PRESERVATION_SUFFIX}")
    }
}

#[async_trait]
impl EditBackend for GptEditClient {
    async fn edit(
        &self,
        image: &[u8],
        options: &ProcessingOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let part = Part::bytes(image.to_vec())
            .file_name("input.png")
            .mime_str("image/png")
            .map_err(|e| BackendError::Unexpected(e.to_string()))?;

        let form = Form::new()
            .part("image", part)
            .text("model", self.model.clone())
            .text("prompt", Self::render_prompt(options))
            .text("size", "1024x1024")
            .text("input_fidelity", "high");

        let response = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(BackendError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let parsed: ImagesEditResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Unexpected(format!("malformed edit response: {e}")))?;

        let datum = parsed
            .data
            .first()
            .ok_or_else(|| BackendError::Unexpected("edit response contained no image".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(&datum.b64_json)
            .map_err(|e| BackendError::Unexpected(format!("invalid base64 image payload: {e}")))
    }
}
