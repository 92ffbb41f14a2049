use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind of processing a job performs, fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    /// Generative edit only.
    GptEdit,
    /// Face swap only.
    FaceSwap,
    /// Generative edit followed by a face swap on the edited image.
    Composite,
}

/// Status of a job in its stage sequence.
///
/// `Editing` and `Faceswap` mark a stage in flight; `Edited` marks the edit
/// stage's artifact as published. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Editing,
    Edited,
    Faceswap,
    Done,
    Failed,
}

impl JobType {
    /// The full forward stage sequence for this job type, `Queued` through `Done`.
    pub fn stages(&self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            JobType::GptEdit => &[Queued, Editing, Edited, Done],
            JobType::FaceSwap => &[Queued, Faceswap, Done],
            JobType::Composite => &[Queued, Editing, Edited, Faceswap, Done],
        }
    }

    /// Whether a forward transition `from -> to` is legal for this type.
    fn allows(&self, from: JobStatus, to: JobStatus) -> bool {
        let stages = self.stages();
        stages
            .windows(2)
            .any(|pair| pair[0] == from && pair[1] == to)
    }
}

impl JobStatus {
    /// Progress percentage implied by this status. `Failed` has no intrinsic
    /// progress; a failed job keeps the value of its last successful stage.
    pub fn progress(&self) -> Option<u8> {
        match self {
            JobStatus::Queued => Some(0),
            JobStatus::Editing => Some(25),
            JobStatus::Edited => Some(50),
            JobStatus::Faceswap => Some(75),
            JobStatus::Done => Some(100),
            JobStatus::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// Classification of a job failure, surfaced via `GET /jobs/{id}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Backend could not be reached (connection refused, timeout). Retryable.
    Unavailable,
    /// Backend inspected the request and declined it (e.g. no face detected).
    Rejected,
    /// Backend failed in an unclassified way.
    Unexpected,
    /// Failure inside the pipeline itself (artifact I/O, missing input).
    Internal,
}

/// Terminal failure record attached to a job, set at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
    /// Status the job held when the failure occurred.
    pub stage: JobStatus,
}

/// What kind of edit the generative backend should apply. Exactly one variant
/// with its field present; validated by the dispatcher before a job exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingOptions {
    Color { color: String },
    Prompt { prompt: String },
}

/// How source faces are assigned to persons in the target image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MappingPolicy {
    Strategy(SwapStrategy),
    /// Explicit person-position indices, one per source face.
    Indices(Vec<u32>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwapStrategy {
    Similarity,
    LeftToRight,
}

impl Default for MappingPolicy {
    fn default() -> Self {
        MappingPolicy::Strategy(SwapStrategy::Similarity)
    }
}

/// A source face to composite onto the target image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceRef {
    /// Opaque person identifier within the target image, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Location of the replacement face image.
    pub source_url: String,
}

/// One client-requested image transformation, tracked through its stage
/// sequence to a terminal outcome. Mutated only through the methods below so
/// the state-machine invariants hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    /// Primary image the job operates on.
    pub image_url: String,
    /// Source faces for person-targeted stages, in submission order.
    pub faces: Vec<FaceRef>,
    /// Present for `gpt_edit` and `composite` jobs.
    pub processing_options: Option<ProcessingOptions>,
    pub mapping: MappingPolicy,
    /// Stage name -> published artifact URL. Append-only.
    pub artifacts: BTreeMap<String, String>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to} for {job_type} job")]
    Illegal {
        job_type: JobType,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job already terminal in status {0}")]
    Terminal(JobStatus),

    #[error("artifact for stage '{0}' already published")]
    ArtifactExists(String),
}

impl Job {
    pub fn new(
        job_type: JobType,
        image_url: String,
        faces: Vec<FaceRef>,
        processing_options: Option<ProcessingOptions>,
        mapping: MappingPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            image_url,
            faces,
            processing_options,
            mapping,
            artifacts: BTreeMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance to the next status in this job's stage sequence.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if !self.job_type.allows(self.status, next) {
            return Err(TransitionError::Illegal {
                job_type: self.job_type,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        // Forward statuses always carry a progress value.
        if let Some(progress) = next.progress() {
            self.progress = progress;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition to `Failed`, recording the error and freezing progress at
    /// its last successful value.
    pub fn fail(
        &mut self,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.error = Some(JobError {
            kind,
            message: message.into(),
            stage: self.status,
        });
        self.status = JobStatus::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a published artifact for a stage. Overwrites are rejected.
    pub fn add_artifact(
        &mut self,
        stage: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<(), TransitionError> {
        let stage = stage.into();
        if self.artifacts.contains_key(&stage) {
            return Err(TransitionError::ArtifactExists(stage));
        }
        self.artifacts.insert(stage, url.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// URL of the final result, present once the job is done.
    pub fn result_url(&self) -> Option<&str> {
        self.artifacts.get("result").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(job_type: JobType) -> Job {
        Job::new(
            job_type,
            "/media/uploads/group.png".to_string(),
            vec![FaceRef {
                id: Some("p1".to_string()),
                source_url: "/media/uploads/face1.png".to_string(),
            }],
            Some(ProcessingOptions::Prompt {
                prompt: "enchanted forest".to_string(),
            }),
            MappingPolicy::default(),
        )
    }

    #[test]
    fn gpt_edit_walks_its_stage_table() {
        let mut j = job(JobType::GptEdit);
        assert_eq!((j.status, j.progress), (JobStatus::Queued, 0));
        j.advance(JobStatus::Editing).unwrap();
        assert_eq!(j.progress, 25);
        j.advance(JobStatus::Edited).unwrap();
        assert_eq!(j.progress, 50);
        j.advance(JobStatus::Done).unwrap();
        assert_eq!(j.progress, 100);
    }

    #[test]
    fn face_swap_skips_edit_stages() {
        let mut j = job(JobType::FaceSwap);
        j.advance(JobStatus::Faceswap).unwrap();
        assert_eq!(j.progress, 75);
        j.advance(JobStatus::Done).unwrap();
        assert_eq!(j.progress, 100);
    }

    #[test]
    fn composite_runs_both_stages() {
        let mut j = job(JobType::Composite);
        for next in [
            JobStatus::Editing,
            JobStatus::Edited,
            JobStatus::Faceswap,
            JobStatus::Done,
        ] {
            j.advance(next).unwrap();
            assert_eq!(j.progress, next.progress().unwrap());
        }
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut j = job(JobType::GptEdit);
        let err = j.advance(JobStatus::Done).unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
        // Job is untouched
        assert_eq!(j.status, JobStatus::Queued);
        assert_eq!(j.progress, 0);
    }

    #[test]
    fn reversing_is_rejected() {
        let mut j = job(JobType::GptEdit);
        j.advance(JobStatus::Editing).unwrap();
        j.advance(JobStatus::Edited).unwrap();
        let err = j.advance(JobStatus::Editing).unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn face_swap_cannot_enter_edit_stages() {
        let mut j = job(JobType::FaceSwap);
        assert!(j.advance(JobStatus::Editing).is_err());
    }

    #[test]
    fn failure_freezes_progress_and_records_stage() {
        let mut j = job(JobType::Composite);
        j.advance(JobStatus::Editing).unwrap();
        j.advance(JobStatus::Edited).unwrap();
        j.fail(FailureKind::Unavailable, "swap engine unreachable")
            .unwrap();
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.progress, 50);
        let err = j.error.as_ref().unwrap();
        assert_eq!(err.kind, FailureKind::Unavailable);
        assert_eq!(err.stage, JobStatus::Edited);
    }

    #[test]
    fn terminal_jobs_reject_further_transitions() {
        let mut j = job(JobType::FaceSwap);
        j.advance(JobStatus::Faceswap).unwrap();
        j.advance(JobStatus::Done).unwrap();
        assert_eq!(
            j.fail(FailureKind::Unexpected, "late"),
            Err(TransitionError::Terminal(JobStatus::Done))
        );
        assert!(j.advance(JobStatus::Done).is_err());

        let mut f = job(JobType::FaceSwap);
        f.fail(FailureKind::Rejected, "no face detected").unwrap();
        assert!(f.advance(JobStatus::Faceswap).is_err());
    }

    #[test]
    fn artifacts_are_append_only() {
        let mut j = job(JobType::GptEdit);
        j.add_artifact("edited", "/media/jobs/x/edited.png").unwrap();
        let err = j
            .add_artifact("edited", "/media/jobs/x/other.png")
            .unwrap_err();
        assert_eq!(err, TransitionError::ArtifactExists("edited".to_string()));
        assert_eq!(
            j.artifacts.get("edited").unwrap(),
            "/media/jobs/x/edited.png"
        );
    }

    #[test]
    fn processing_options_round_trip_tagged() {
        let opts: ProcessingOptions =
            serde_json::from_str(r##"{"type":"color","color":"#ffcc00"}"##).unwrap();
        assert_eq!(
            opts,
            ProcessingOptions::Color {
                color: "#ffcc00".to_string()
            }
        );
    }

    #[test]
    fn mapping_policy_accepts_strategy_or_indices() {
        let m: MappingPolicy = serde_json::from_str(r#""left_to_right""#).unwrap();
        assert_eq!(m, MappingPolicy::Strategy(SwapStrategy::LeftToRight));
        let m: MappingPolicy = serde_json::from_str("[2,0,1]").unwrap();
        assert_eq!(m, MappingPolicy::Indices(vec![2, 0, 1]));
    }
}
