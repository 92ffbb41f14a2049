use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tower::ServiceExt;
use uuid::Uuid;

use photopipe::app_state::AppState;
use photopipe::models::api::{ErrorBody, JobCreatedResponse, JobStatusResponse};
use photopipe::models::job::{JobStatus, JobType};
use photopipe::routes;
use photopipe::services::artifacts::ArtifactStore;
use photopipe::services::dispatcher::Dispatcher;
use photopipe::services::registry::JobRegistry;

struct TestApp {
    router: Router,
    registry: Arc<JobRegistry>,
    // Keeps the queue open; handlers enqueue into it.
    _queue_rx: UnboundedReceiver<Uuid>,
}

async fn test_app() -> TestApp {
    test_app_with_base("/media").await
}

async fn test_app_with_base(public_base_url: &str) -> TestApp {
    let media_root = std::env::temp_dir().join(format!("photopipe-api-{}", Uuid::new_v4()));
    let artifacts = Arc::new(ArtifactStore::new(&media_root, public_base_url));
    artifacts.ensure_dirs().await.expect("media dirs");

    let registry = Arc::new(JobRegistry::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), tx);

    let state = AppState::new(Arc::clone(&registry), artifacts, dispatcher);
    TestApp {
        router: routes::router(state),
        registry,
        _queue_rx: rx,
    }
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn submitting_a_job_returns_201_and_a_pollable_id() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "/jobs",
            serde_json::json!({
                "image_url": "/media/uploads/group.png",
                "person_ids": ["/media/uploads/p1.png"],
                "processing_options": {"type": "prompt", "prompt": "enchanted forest"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobCreatedResponse = body_json(response).await;
    assert_eq!(created.status, JobStatus::Queued);
    assert_eq!(created.mode, JobType::Composite);
    assert_eq!(created.links.self_url, format!("/jobs/{}", created.job_id));

    // The id is immediately pollable
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/jobs/{}", created.job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: JobStatusResponse = body_json(response).await;
    assert_eq!(status.job_id, created.job_id);
    assert_eq!(status.progress, 0);
    assert!(status.result_url.is_none());
}

#[tokio::test]
async fn invalid_submissions_get_400_and_create_nothing() {
    let app = test_app().await;

    let cases = [
        // No valid person targets
        (
            serde_json::json!({
                "image_url": "/media/uploads/g.png",
                "person_ids": [],
                "processing_options": {"type": "prompt", "prompt": "x"}
            }),
            "missing_targets",
        ),
        // Unknown processing option type
        (
            serde_json::json!({
                "image_url": "/media/uploads/g.png",
                "person_ids": ["/media/uploads/p1.png"],
                "processing_options": {"type": "sepia"}
            }),
            "unsupported_option",
        ),
        // Declared type without its payload field
        (
            serde_json::json!({
                "image_url": "/media/uploads/g.png",
                "person_ids": ["/media/uploads/p1.png"],
                "processing_options": {"type": "color"}
            }),
            "missing_field",
        ),
    ];

    for (body, expected_code) in cases {
        let response = app
            .router
            .clone()
            .oneshot(json_request("/jobs", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorBody = body_json(response).await;
        assert_eq!(error.error.code, expected_code);
    }

    assert_eq!(app.registry.len().await, 0);
}

#[tokio::test]
async fn gpt_edit_endpoint_requires_a_prompt() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "/jobs/gpt-edit",
            serde_json::json!({"input_image_url": "/media/uploads/a.png"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .oneshot(json_request(
            "/jobs/gpt-edit",
            serde_json::json!({
                "input_image_url": "/media/uploads/a.png",
                "prompt": "watercolor style"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobCreatedResponse = body_json(response).await;
    assert_eq!(created.mode, JobType::GptEdit);
}

#[tokio::test]
async fn face_swap_endpoint_accepts_explicit_mapping() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(json_request(
            "/jobs/face-swap",
            serde_json::json!({
                "input_image_url": "/media/uploads/a.png",
                "faces": [
                    {"id": "p1", "source_url": "/media/uploads/f1.png"},
                    {"source_url": "/media/uploads/f2.png"}
                ],
                "mapping": [1, 0]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobCreatedResponse = body_json(response).await;
    assert_eq!(created.mode, JobType::FaceSwap);
}

#[tokio::test]
async fn unknown_job_id_is_404() {
    let app = test_app().await;

    // Well-formed but unknown, and ids that don't even parse: both are
    // simply jobs this server never issued.
    for id in [Uuid::new_v4().to_string(), "not-a-job-id".to_string()] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorBody = body_json(response).await;
        assert_eq!(error.error.code, "not_found");
    }
}

#[tokio::test]
async fn job_links_follow_the_configured_public_base() {
    let app = test_app_with_base("http://cdn.example/assets").await;

    let response = app
        .router
        .oneshot(json_request(
            "/jobs/gpt-edit",
            serde_json::json!({
                "input_image_url": "http://cdn.example/assets/uploads/a.png",
                "prompt": "sunset"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobCreatedResponse = body_json(response).await;
    assert_eq!(
        created.links.artifacts,
        format!("http://cdn.example/assets/jobs/{}/", created.job_id)
    );
}

#[tokio::test]
async fn terminal_jobs_poll_stably() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "/jobs/gpt-edit",
            serde_json::json!({
                "input_image_url": "/media/uploads/a.png",
                "prompt": "sunset"
            }),
        ))
        .await
        .unwrap();
    let created: JobCreatedResponse = body_json(response).await;
    let id = created.job_id;

    // Drive the job to done the way the worker would
    app.registry.advance(id, JobStatus::Editing).await.unwrap();
    app.registry
        .add_artifact(id, "edited", format!("/media/jobs/{id}/edited.png"))
        .await
        .unwrap();
    app.registry.advance(id, JobStatus::Edited).await.unwrap();
    app.registry
        .add_artifact(id, "result", format!("/media/jobs/{id}/result.png"))
        .await
        .unwrap();
    app.registry.advance(id, JobStatus::Done).await.unwrap();

    // Two consecutive polls agree on everything
    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: JobStatusResponse = body_json(response).await;
        assert_eq!(status.status, JobStatus::Done);
        assert_eq!(status.progress, 100);
        assert_eq!(
            status.result_url.as_deref(),
            Some(format!("/media/jobs/{id}/result.png").as_str())
        );
        assert!(status.error.is_none());
    }
}

#[tokio::test]
async fn queue_status_reports_registry_counts() {
    let app = test_app().await;

    for _ in 0..3 {
        app.router
            .clone()
            .oneshot(json_request(
                "/jobs/gpt-edit",
                serde_json::json!({
                    "input_image_url": "/media/uploads/a.png",
                    "prompt": "sunset"
                }),
            ))
            .await
            .unwrap();
    }

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/jobs/queue/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let counts: serde_json::Value = body_json(response).await;
    assert_eq!(counts["total"], 3);
    assert_eq!(counts["queued"], 3);
    assert_eq!(counts["done"], 0);
}

#[tokio::test]
async fn health_reports_ok_with_job_counts() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = body_json(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["checks"]["artifact_store"]["status"], "ok");
    assert_eq!(health["jobs"]["total"], 0);
}

#[tokio::test]
async fn upload_stores_the_file_and_rejects_non_images() {
    let app = test_app().await;

    let boundary = "XPHOTOPIPEBOUNDARY";
    let png_magic: &[u8] = b"\x89PNG\r\n\x1a\n";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(png_magic);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded: serde_json::Value = body_json(response).await;
    assert_eq!(uploaded["success"], true);
    let file_url = uploaded["data"]["file_url"].as_str().unwrap().to_string();
    assert!(file_url.starts_with("/media/uploads/photo_"));

    // A text file behind an image extension is rejected on content
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"fake.png\"\r\nContent-Type: image/png\r\n\r\nnot an image"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
