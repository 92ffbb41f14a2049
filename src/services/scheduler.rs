use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::models::job::{FailureKind, Job, JobStatus, JobType, MappingPolicy};
use crate::services::artifacts::{ArtifactError, ArtifactStore};
use crate::services::backends::{BackendError, EditBackend, SourceFace, SwapBackend};
use crate::services::registry::{JobRegistry, RegistryError};

/// Bounded retry with exponential backoff, applied to transient backend
/// failures only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// A failure that terminates a job, carried to the registry as its error
/// record.
#[derive(Debug)]
struct StageFailure {
    kind: FailureKind,
    message: String,
}

impl StageFailure {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal,
            message: message.into(),
        }
    }
}

impl From<BackendError> for StageFailure {
    fn from(err: BackendError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ArtifactError> for StageFailure {
    fn from(err: ArtifactError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<RegistryError> for StageFailure {
    fn from(err: RegistryError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Executes queued jobs: pulls ids off the shared queue, runs each job's
/// stage sequence strictly in order against the backends, publishes
/// artifacts, and records the outcome in the registry.
///
/// Each job is owned by exactly one worker at a time; distinct jobs run
/// concurrently up to the pool size.
pub struct Scheduler {
    registry: Arc<JobRegistry>,
    artifacts: Arc<ArtifactStore>,
    edit_backend: Arc<dyn EditBackend>,
    swap_backend: Arc<dyn SwapBackend>,
    retry: RetryPolicy,
    stage_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        artifacts: Arc<ArtifactStore>,
        edit_backend: Arc<dyn EditBackend>,
        swap_backend: Arc<dyn SwapBackend>,
        retry: RetryPolicy,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            artifacts,
            edit_backend,
            swap_backend,
            retry,
            stage_timeout,
        }
    }

    /// Start `worker_count` workers sharing one queue. Returns the submission
    /// side of the queue and the worker handles. Workers exit when every
    /// sender is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        worker_count: usize,
    ) -> (mpsc::UnboundedSender<Uuid>, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..worker_count)
            .map(|worker| {
                let scheduler = Arc::clone(self);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    tracing::debug!(worker, "worker started");
                    loop {
                        // The lock is held only while waiting for the next id.
                        let job_id = { rx.lock().await.recv().await };
                        match job_id {
                            Some(id) => scheduler.process(worker, id).await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();

        (tx, handles)
    }

    /// Run one job to a terminal state. Never propagates an error: failures
    /// are recorded on the job so one bad job cannot take down the pool.
    async fn process(&self, worker: usize, job_id: Uuid) {
        let Some(job) = self.registry.get(job_id).await else {
            tracing::warn!(worker, job_id = %job_id, "queued id not in registry, dropping");
            return;
        };
        if job.status != JobStatus::Queued {
            tracing::warn!(worker, job_id = %job_id, status = %job.status, "job not queued, skipping");
            return;
        }

        metrics::gauge!("job_queue_depth").decrement(1.0);
        tracing::info!(worker, job_id = %job_id, mode = %job.job_type, "processing job");
        let start = Instant::now();

        match self.run(&job).await {
            Ok(()) => {
                metrics::counter!("jobs_completed_total").increment(1);
                tracing::info!(
                    worker,
                    job_id = %job_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "job completed"
                );
            }
            Err(failure) => {
                metrics::counter!("jobs_failed_total").increment(1);
                tracing::error!(
                    worker,
                    job_id = %job_id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "job failed"
                );
                if let Err(e) = self
                    .registry
                    .fail(job_id, failure.kind, failure.message)
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %e, "could not record job failure");
                }
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<(), StageFailure> {
        let id = job.id;

        self.artifacts
            .write_params(
                id,
                &serde_json::json!({
                    "mode": job.job_type,
                    "image_url": job.image_url,
                    "faces": job.faces,
                    "processing_options": job.processing_options,
                    "mapping": job.mapping,
                }),
            )
            .await?;

        let input_path = self.artifacts.resolve_url(&job.image_url)?;
        let input = fs::read(&input_path).await.map_err(|e| {
            StageFailure::internal(format!(
                "base image not readable: {}: {e}",
                input_path.display()
            ))
        })?;

        match job.job_type {
            JobType::GptEdit => {
                let edited = self.run_edit_stage(job, &input).await?;
                self.finish(id, &edited).await
            }
            JobType::FaceSwap => {
                self.registry.advance(id, JobStatus::Faceswap).await?;
                let faces = self.load_faces(job).await?;
                let swapped = self.swap_stage(id, &input, &faces, &job.mapping).await?;
                let url = self.artifacts.publish(id, "swapped", &swapped).await?;
                self.registry.add_artifact(id, "swapped", url).await?;
                self.finish(id, &swapped).await
            }
            JobType::Composite => {
                // Swap faces in the edited image so the edit intent carries
                // through to the final composite.
                let edited = self.run_edit_stage(job, &input).await?;
                self.registry.advance(id, JobStatus::Faceswap).await?;
                let faces = self.load_faces(job).await?;
                let swapped = self.swap_stage(id, &edited, &faces, &job.mapping).await?;
                let url = self.artifacts.publish(id, "swapped", &swapped).await?;
                self.registry.add_artifact(id, "swapped", url).await?;
                self.finish(id, &swapped).await
            }
        }
    }

    /// Edit stage shared by `gpt_edit` and `composite`: Editing -> publish
    /// "edited" artifact -> Edited.
    async fn run_edit_stage(&self, job: &Job, input: &[u8]) -> Result<Vec<u8>, StageFailure> {
        let id = job.id;
        let options = job
            .processing_options
            .as_ref()
            .ok_or_else(|| StageFailure::internal("edit job without processing options"))?;

        self.registry.advance(id, JobStatus::Editing).await?;

        let start = Instant::now();
        let edited = self
            .with_retry(id, "edit", || async {
                self.bounded(self.edit_backend.edit(input, options)).await
            })
            .await?;
        metrics::histogram!("stage_processing_seconds", "stage" => "edit")
            .record(start.elapsed().as_secs_f64());

        let url = self.artifacts.publish(id, "edited", &edited).await?;
        self.registry.add_artifact(id, "edited", url).await?;
        self.registry.advance(id, JobStatus::Edited).await?;
        Ok(edited)
    }

    async fn swap_stage(
        &self,
        job_id: Uuid,
        target: &[u8],
        faces: &[SourceFace],
        mapping: &MappingPolicy,
    ) -> Result<Vec<u8>, StageFailure> {
        let start = Instant::now();
        let swapped = self
            .with_retry(job_id, "faceswap", || async {
                self.bounded(self.swap_backend.swap(target, faces, mapping))
                    .await
            })
            .await?;
        metrics::histogram!("stage_processing_seconds", "stage" => "faceswap")
            .record(start.elapsed().as_secs_f64());
        Ok(swapped)
    }

    /// Publish the final result file and move to `Done`.
    async fn finish(&self, id: Uuid, result: &[u8]) -> Result<(), StageFailure> {
        let url = self.artifacts.publish(id, "result", result).await?;
        self.registry.add_artifact(id, "result", url).await?;
        self.registry.advance(id, JobStatus::Done).await?;
        Ok(())
    }

    /// Resolve the job's face references to bytes, keeping submission order.
    async fn load_faces(&self, job: &Job) -> Result<Vec<SourceFace>, StageFailure> {
        let mut faces = Vec::with_capacity(job.faces.len());
        for (position, face) in job.faces.iter().enumerate() {
            if face.source_url.trim().is_empty() {
                tracing::warn!(job_id = %job.id, position, "skipping blank face reference");
                continue;
            }
            let path = self.artifacts.resolve_url(&face.source_url)?;
            let bytes = fs::read(&path).await.map_err(|e| {
                StageFailure::internal(format!("face image not readable: {}: {e}", path.display()))
            })?;
            faces.push(SourceFace {
                position,
                person_id: face.id.clone(),
                bytes,
            });
        }
        if faces.is_empty() {
            return Err(StageFailure::internal("no usable face images"));
        }
        Ok(faces)
    }

    /// Cap a backend call at the stage timeout; timeouts count as transient.
    async fn bounded<Fut>(&self, call: Fut) -> Result<Vec<u8>, BackendError>
    where
        Fut: Future<Output = Result<Vec<u8>, BackendError>>,
    {
        match timeout(self.stage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Unavailable(format!(
                "backend call timed out after {:?}",
                self.stage_timeout
            ))),
        }
    }

    async fn with_retry<F, Fut>(
        &self,
        job_id: Uuid,
        stage: &str,
        call: F,
    ) -> Result<Vec<u8>, BackendError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BackendError>>,
    {
        let mut attempt = 1u32;
        loop {
            match call().await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient backend failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
