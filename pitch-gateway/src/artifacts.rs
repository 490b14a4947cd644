//! Download of generated documents (decks, executive summaries, Q&A PDFs).

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::routes::{AppState, ErrorResponse};

/// Extensions that may be downloaded.
const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".docx"];

/// Whether `name` is a plain file name with an allowed extension.
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty()
        || name.contains("..")
        || name.contains(['/', '\\', '"'])
        || name.chars().any(char::is_control)
    {
        return false;
    }
    ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Content type served for `name`.
pub fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else {
        "text/plain"
    }
}

pub(crate) async fn download_artifact_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if !is_safe_filename(&filename) {
        return Err(ErrorResponse::reply(
            StatusCode::BAD_REQUEST,
            "Invalid filename",
            "INVALID_FILENAME",
        ));
    }

    let path = state.artifacts_root.join(&filename);
    let not_found = || ErrorResponse::reply(StatusCode::NOT_FOUND, "File not found", "NOT_FOUND");

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(not_found()),
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to read artifact");
        ErrorResponse::reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read file",
            "ARTIFACT_ERROR",
        )
    })?;

    tracing::info!(filename = %filename, bytes = bytes.len(), "Serving artifact");

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
