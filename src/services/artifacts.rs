use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Filesystem-backed artifact store.
///
/// Layout contract shared with the static file server: one directory per job
/// under `<media_root>/jobs/<job_id>/`, one file per published stage plus a
/// final `result.png`, and a `params.json` recording the request. Uploads
/// live under `<media_root>/uploads/`.
pub struct ArtifactStore {
    media_root: PathBuf,
    public_base_url: String,
    /// Path portion of `public_base_url`, e.g. "/media".
    public_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact already published: job {job_id}, stage '{stage}'")]
    AlreadyPublished { job_id: Uuid, stage: String },

    #[error("URL does not resolve to local media: {0}")]
    ForeignUrl(String),

    #[error("could not serialize job parameters: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ArtifactStore {
    /// `public_base_url` is the client-visible prefix for `media_root`,
    /// either absolute ("https://host/media") or path-only ("/media").
    pub fn new(media_root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        let public_path = match public_base_url.find("://") {
            Some(scheme_end) => match public_base_url[scheme_end + 3..].find('/') {
                Some(path_start) => public_base_url[scheme_end + 3 + path_start..].to_string(),
                None => String::new(),
            },
            None => public_base_url.clone(),
        };
        Self {
            media_root: media_root.into(),
            public_base_url,
            public_path,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.media_root.join("uploads")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.media_root.join("jobs")
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.jobs_dir().join(job_id.to_string())
    }

    /// Client-visible prefix of a job's artifact directory.
    pub fn job_url_prefix(&self, job_id: Uuid) -> String {
        format!("{}/jobs/{job_id}/", self.public_base_url)
    }

    /// Create the media directory tree. Called once at startup.
    pub async fn ensure_dirs(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(self.uploads_dir()).await?;
        fs::create_dir_all(self.jobs_dir()).await?;
        Ok(())
    }

    /// Client-visible URL for a path under `media_root`.
    pub fn public_url(&self, path: &Path) -> Result<String, ArtifactError> {
        let rel = path
            .strip_prefix(&self.media_root)
            .map_err(|_| ArtifactError::ForeignUrl(path.display().to_string()))?;
        let mut url = self.public_base_url.clone();
        for component in rel.components() {
            url.push('/');
            url.push_str(&component.as_os_str().to_string_lossy());
        }
        Ok(url)
    }

    /// Resolve a client-visible URL back to a path under `media_root`.
    /// Accepts both the absolute and the path-only form of the public base.
    pub fn resolve_url(&self, url: &str) -> Result<PathBuf, ArtifactError> {
        let rel = url
            .strip_prefix(&self.public_base_url)
            .or_else(|| {
                if self.public_path.is_empty() {
                    None
                } else {
                    url.strip_prefix(&self.public_path)
                }
            })
            .ok_or_else(|| ArtifactError::ForeignUrl(url.to_string()))?;
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() || rel.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ArtifactError::ForeignUrl(url.to_string()));
        }
        Ok(self.media_root.join(rel))
    }

    /// Publish a stage artifact and return its public URL.
    ///
    /// Writes to a temp file in the job directory and renames it into place,
    /// so a partially written artifact is never visible under its published
    /// name. Publishing the same stage twice is an error.
    pub async fn publish(
        &self,
        job_id: Uuid,
        stage: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).await?;

        let published = dir.join(format!("{stage}.png"));
        if fs::try_exists(&published).await? {
            return Err(ArtifactError::AlreadyPublished {
                job_id,
                stage: stage.to_string(),
            });
        }

        let tmp = dir.join(format!(".{stage}.png.tmp"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &published).await?;

        self.public_url(&published)
    }

    /// Record the submitted request parameters alongside the artifacts.
    pub async fn write_params(
        &self,
        job_id: Uuid,
        params: &serde_json::Value,
    ) -> Result<(), ArtifactError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).await?;
        let bytes = serde_json::to_vec_pretty(params)?;
        fs::write(dir.join("params.json"), bytes).await?;
        Ok(())
    }
}
