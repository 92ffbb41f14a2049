use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root of the media tree (uploads and job artifacts).
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    /// Client-visible URL prefix for `media_root`; the reverse proxy serves
    /// files under it. Absolute ("https://host/media") or path-only ("/media").
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// OpenAI API key for the generative edit backend
    pub openai_api_key: String,

    /// OpenAI API base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Image edit model name
    #[serde(default = "default_gpt_image_model")]
    pub gpt_image_model: String,

    /// Base URL of the face-swap engine
    pub faceswap_url: String,

    /// Number of concurrent job workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Attempts per backend call before a transient failure becomes fatal
    #[serde(default = "default_backend_max_attempts")]
    pub backend_max_attempts: u32,

    /// Base delay for exponential retry backoff, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single backend call, in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}

fn default_public_base_url() -> String {
    "/media".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_gpt_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_backend_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_stage_timeout_secs() -> u64 {
    120
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}
