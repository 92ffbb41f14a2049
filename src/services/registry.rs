use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::{FailureKind, Job, JobStatus, TransitionError};

/// In-process job table, the single source of truth for job state.
///
/// Readers get cloned snapshots; all mutations go through [`update`] under
/// the write lock, so a poller never observes a half-applied transition.
/// After creation only the scheduler mutates a given job, one worker at a
/// time, which serializes updates per job without extra locking.
///
/// [`update`]: JobRegistry::update
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

/// Per-status counts over the whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub queued: usize,
    pub editing: usize,
    pub edited: usize,
    pub faceswap: usize,
    pub done: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly created job and return its id.
    pub async fn insert(&self, job: Job) -> Uuid {
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        id
    }

    /// Snapshot of a job by id.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Apply a mutation to one job under the write lock. The closure's
    /// changes become visible to readers atomically.
    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Job) -> Result<T, TransitionError>,
    ) -> Result<T, RegistryError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        f(job).map_err(RegistryError::from)
    }

    pub async fn advance(&self, id: Uuid, next: JobStatus) -> Result<(), RegistryError> {
        self.update(id, |job| job.advance(next)).await
    }

    pub async fn fail(
        &self,
        id: Uuid,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let message = message.into();
        self.update(id, move |job| job.fail(kind, message)).await
    }

    pub async fn add_artifact(
        &self,
        id: Uuid,
        stage: &str,
        url: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let url = url.into();
        self.update(id, move |job| job.add_artifact(stage, url)).await
    }

    pub async fn status_counts(&self) -> StatusCounts {
        let jobs = self.jobs.read().await;
        let mut counts = StatusCounts {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Editing => counts.editing += 1,
                JobStatus::Edited => counts.edited += 1,
                JobStatus::Faceswap => counts.faceswap += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
