use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::api::{
    CreateFaceSwapRequest, CreateGptEditRequest, CreateJobRequest, ProcessingOptionsPayload,
};
use crate::models::job::{
    FaceRef, Job, JobType, MappingPolicy, ProcessingOptions, SwapStrategy,
};
use crate::services::registry::JobRegistry;

/// Client input rejected at submission; no job is created.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("person_ids must contain at least one valid person ID")]
    MissingTargets,

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unsupported processing_options.type: '{0}'")]
    UnsupportedOption(String),
}

impl ValidationError {
    /// Machine-readable error code for the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingTargets => "missing_targets",
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::UnsupportedOption(_) => "unsupported_option",
        }
    }
}

/// Validates incoming requests, creates jobs, and hands their ids to the
/// worker pool. Creation is synchronous; execution is not.
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    queue: UnboundedSender<Uuid>,
}

impl Dispatcher {
    pub fn new(registry: Arc<JobRegistry>, queue: UnboundedSender<Uuid>) -> Self {
        Self { registry, queue }
    }

    /// `POST /jobs`: person-targeted edit plus face swap (composite job).
    pub async fn submit(&self, request: CreateJobRequest) -> Result<Job, ValidationError> {
        let faces: Vec<FaceRef> = request
            .person_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| FaceRef {
                id: Some(id.clone()),
                source_url: id.clone(),
            })
            .collect();
        if faces.is_empty() {
            return Err(ValidationError::MissingTargets);
        }

        let options = parse_options(&request.processing_options)?;

        let job = Job::new(
            JobType::Composite,
            request.image_url,
            faces,
            Some(options),
            MappingPolicy::Strategy(SwapStrategy::LeftToRight),
        );
        Ok(self.enqueue(job).await)
    }

    /// `POST /jobs/gpt-edit`: generative edit only.
    pub async fn submit_gpt_edit(
        &self,
        request: CreateGptEditRequest,
    ) -> Result<Job, ValidationError> {
        let prompt = request
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or(ValidationError::MissingField { field: "prompt" })?;

        let job = Job::new(
            JobType::GptEdit,
            request.input_image_url,
            Vec::new(),
            Some(ProcessingOptions::Prompt { prompt }),
            MappingPolicy::default(),
        );
        Ok(self.enqueue(job).await)
    }

    /// `POST /jobs/face-swap`: face swap only.
    pub async fn submit_face_swap(
        &self,
        request: CreateFaceSwapRequest,
    ) -> Result<Job, ValidationError> {
        let faces: Vec<FaceRef> = request
            .faces
            .into_iter()
            .filter(|face| !face.source_url.trim().is_empty())
            .collect();
        if faces.is_empty() {
            return Err(ValidationError::MissingTargets);
        }

        let job = Job::new(
            JobType::FaceSwap,
            request.input_image_url,
            faces,
            None,
            request.mapping,
        );
        Ok(self.enqueue(job).await)
    }

    async fn enqueue(&self, job: Job) -> Job {
        let id = self.registry.insert(job.clone()).await;

        metrics::counter!("jobs_submitted_total").increment(1);
        metrics::gauge!("job_queue_depth").increment(1.0);

        tracing::info!(job_id = %id, mode = %job.job_type, "job created");

        // Only fails when every worker has shut down.
        if self.queue.send(id).is_err() {
            tracing::error!(job_id = %id, "worker queue closed, job will not run");
        }
        job
    }
}

/// Turn the free-form options payload into the validated tagged union.
fn parse_options(payload: &ProcessingOptionsPayload) -> Result<ProcessingOptions, ValidationError> {
    match payload.kind.as_str() {
        "prompt" => payload
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| ProcessingOptions::Prompt {
                prompt: p.to_string(),
            })
            .ok_or(ValidationError::MissingField { field: "prompt" }),
        "color" => payload
            .color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| ProcessingOptions::Color {
                color: c.to_string(),
            })
            .ok_or(ValidationError::MissingField { field: "color" }),
        other => Err(ValidationError::UnsupportedOption(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use tokio::sync::mpsc;

    fn dispatcher() -> (
        Dispatcher,
        Arc<JobRegistry>,
        mpsc::UnboundedReceiver<Uuid>,
    ) {
        let registry = Arc::new(JobRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(Arc::clone(&registry), tx), registry, rx)
    }

    fn request(kind: &str, prompt: Option<&str>, color: Option<&str>) -> CreateJobRequest {
        CreateJobRequest {
            image_url: "/media/uploads/group.png".to_string(),
            person_ids: vec!["/media/uploads/p1.png".to_string()],
            processing_options: ProcessingOptionsPayload {
                kind: kind.to_string(),
                prompt: prompt.map(str::to_string),
                color: color.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn valid_request_creates_queued_job_and_enqueues_it() {
        let (dispatcher, registry, mut rx) = dispatcher();

        let job = dispatcher
            .submit(request("prompt", Some("enchanted forest"), None))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.job_type, JobType::Composite);
        assert_eq!(registry.len().await, 1);
        assert_eq!(rx.try_recv().unwrap(), job.id);
    }

    #[tokio::test]
    async fn empty_person_ids_is_missing_targets() {
        let (dispatcher, registry, mut rx) = dispatcher();

        let mut req = request("prompt", Some("x"), None);
        req.person_ids = Vec::new();
        assert_eq!(
            dispatcher.submit(req).await.unwrap_err(),
            ValidationError::MissingTargets
        );

        // Blank-only ids count as empty
        let mut req = request("prompt", Some("x"), None);
        req.person_ids = vec!["  ".to_string()];
        assert_eq!(
            dispatcher.submit(req).await.unwrap_err(),
            ValidationError::MissingTargets
        );

        assert_eq!(registry.len().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn prompt_type_without_prompt_is_missing_field() {
        let (dispatcher, registry, _rx) = dispatcher();

        for req in [
            request("prompt", None, None),
            request("prompt", Some(""), None),
        ] {
            assert_eq!(
                dispatcher.submit(req).await.unwrap_err(),
                ValidationError::MissingField { field: "prompt" }
            );
        }
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn color_type_without_color_is_missing_field() {
        let (dispatcher, _registry, _rx) = dispatcher();

        assert_eq!(
            dispatcher.submit(request("color", None, None)).await.unwrap_err(),
            ValidationError::MissingField { field: "color" }
        );
    }

    #[tokio::test]
    async fn unknown_option_type_is_unsupported() {
        let (dispatcher, registry, _rx) = dispatcher();

        let err = dispatcher
            .submit(request("sepia", None, None))
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedOption("sepia".to_string()));
        assert_eq!(err.code(), "unsupported_option");
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn gpt_edit_requires_prompt() {
        let (dispatcher, _registry, _rx) = dispatcher();

        let err = dispatcher
            .submit_gpt_edit(CreateGptEditRequest {
                input_image_url: "/media/uploads/a.png".to_string(),
                prompt: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "prompt" });
    }

    #[tokio::test]
    async fn face_swap_requires_faces() {
        let (dispatcher, _registry, _rx) = dispatcher();

        let err = dispatcher
            .submit_face_swap(CreateFaceSwapRequest {
                input_image_url: "/media/uploads/a.png".to_string(),
                faces: Vec::new(),
                mapping: MappingPolicy::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingTargets);
    }

    #[tokio::test]
    async fn face_swap_job_keeps_submission_order_and_mapping() {
        let (dispatcher, _registry, _rx) = dispatcher();

        let job = dispatcher
            .submit_face_swap(CreateFaceSwapRequest {
                input_image_url: "/media/uploads/a.png".to_string(),
                faces: vec![
                    FaceRef {
                        id: Some("p1".to_string()),
                        source_url: "/media/uploads/f1.png".to_string(),
                    },
                    FaceRef {
                        id: None,
                        source_url: "/media/uploads/f2.png".to_string(),
                    },
                ],
                mapping: MappingPolicy::Indices(vec![1, 0]),
            })
            .await
            .unwrap();

        assert_eq!(job.job_type, JobType::FaceSwap);
        assert_eq!(job.faces.len(), 2);
        assert_eq!(job.faces[0].id.as_deref(), Some("p1"));
        assert_eq!(job.mapping, MappingPolicy::Indices(vec![1, 0]));
        assert!(job.processing_options.is_none());
    }
}
