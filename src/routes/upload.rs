use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::ErrorBody;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const MAX_FILE_SIZE: usize = 50 * 1024 * 1024; // 50MB

/// POST /upload — store an image under the uploads directory and return its
/// public URL, usable as `image_url` or a face reference in job submissions.
pub async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            match field.bytes().await {
                Ok(data) => upload = Some((filename, content_type, data.to_vec())),
                Err(_) => return error(StatusCode::BAD_REQUEST, "invalid_request", "Malformed upload"),
            }
        }
    }

    let Some((filename, content_type, data)) = upload else {
        return error(StatusCode::BAD_REQUEST, "invalid_request", "No file selected");
    };

    if filename.is_empty() {
        return error(StatusCode::BAD_REQUEST, "invalid_request", "No file selected");
    }

    if !is_allowed_file(&filename, content_type.as_deref()) {
        return error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!(
                "File type not allowed. Allowed types: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ),
        );
    }

    if data.len() > MAX_FILE_SIZE {
        return error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "file_too_large",
            format!("File too large. Maximum size: {}MB", MAX_FILE_SIZE / (1024 * 1024)),
        );
    }

    // The extension says image; make sure the bytes agree.
    if image::guess_format(&data).is_err() {
        return error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "invalid_image",
            "File is not a recognized image format",
        );
    }

    let saved_filename = unique_filename(&filename);
    let path = state.artifacts.uploads_dir().join(&saved_filename);

    if let Err(e) = tokio::fs::write(&path, &data).await {
        tracing::error!(error = %e, path = %path.display(), "upload write failed");
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Upload failed",
        );
    }

    let file_url = match state.artifacts.public_url(&path) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "upload saved outside media root");
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Upload failed",
            );
        }
    };

    tracing::info!(filename = %saved_filename, size = data.len(), "file uploaded");

    Json(serde_json::json!({
        "success": true,
        "message": "File uploaded successfully",
        "data": {
            "original_filename": filename,
            "saved_filename": saved_filename,
            "file_url": file_url,
            "file_size": data.len(),
            "content_type": content_type,
            "upload_time": Utc::now().to_rfc3339(),
        }
    }))
    .into_response()
}

/// GET /uploads — list uploaded files, newest first.
pub async fn list_uploads(State(state): State<AppState>) -> Response {
    let dir = state.artifacts.uploads_dir();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(error = %e, "failed to list uploads");
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to list files",
            );
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<Utc>::from);
        let Ok(file_url) = state.artifacts.public_url(&path) else {
            continue;
        };
        files.push(serde_json::json!({
            "filename": entry.file_name().to_string_lossy(),
            "file_url": file_url,
            "size": metadata.len(),
            "modified": modified.map(|t| t.to_rfc3339()),
        }));
    }

    files.sort_by(|a, b| b["modified"].as_str().cmp(&a["modified"].as_str()));

    Json(serde_json::json!({
        "success": true,
        "data": { "files": files, "total_count": files.len() }
    }))
    .into_response()
}

/// GET /uploads/{filename} — info about one uploaded file.
pub async fn check_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    // Uploads are a flat directory; anything path-like is not a filename.
    if filename.contains('/') || filename.contains('\\') || filename == ".." {
        return error(StatusCode::NOT_FOUND, "not_found", "File not found");
    }

    let path = state.artifacts.uploads_dir().join(&filename);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            return error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("File '{filename}' not found"),
            )
        }
    };

    let file_url = match state.artifacts.public_url(&path) {
        Ok(url) => url,
        Err(_) => return error(StatusCode::NOT_FOUND, "not_found", "File not found"),
    };

    Json(serde_json::json!({
        "success": true,
        "message": "File found",
        "data": {
            "filename": filename,
            "file_url": file_url,
            "size": metadata.len(),
            "modified": metadata
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<Utc>::from(t).to_rfc3339()),
            "content_type": content_type_for(&filename),
        }
    }))
    .into_response()
}

fn is_allowed_file(filename: &str, content_type: Option<&str>) -> bool {
    let Some(ext) = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
    else {
        return false;
    };
    if !ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        return false;
    }
    match content_type {
        Some(ct) => ct.starts_with("image/"),
        None => true,
    }
}

/// Unique saved name preserving the original stem: `stem_YYYYMMDD_HHMMSS_xxxxxxxx.ext`.
fn unique_filename(original: &str) -> String {
    let path = std::path::Path::new(original);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!("{stem}_{timestamp}_{}.{ext}", &unique[..8])
}

fn content_type_for(filename: &str) -> &'static str {
    match std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(code, message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_file_checks_extension_and_content_type() {
        assert!(is_allowed_file("photo.png", Some("image/png")));
        assert!(is_allowed_file("photo.JPG", None));
        assert!(!is_allowed_file("notes.txt", Some("text/plain")));
        assert!(!is_allowed_file("photo.png", Some("application/pdf")));
        assert!(!is_allowed_file("noextension", None));
    }

    #[test]
    fn unique_filename_keeps_stem_and_extension() {
        let name = unique_filename("family photo.PNG");
        assert!(name.starts_with("family photo_"));
        assert!(name.ends_with(".png"));
        assert_ne!(unique_filename("a.png"), unique_filename("a.png"));
    }
}
