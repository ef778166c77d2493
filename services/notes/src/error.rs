use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the notes table
#[derive(Error, Debug)]
#[error("note store error: {0}")]
pub struct StoreError(#[from] pub sqlx::Error);

/// Failure persisting an upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read upload body: {0}")]
    Body(#[from] MultipartError),

    #[error("failed to write upload to disk: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to put object {key} into bucket {bucket}: {message}")]
    ObjectStore {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Errors surfaced at the request boundary
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("no file in upload request")]
    BadRequest,

    #[error("request body declared as JSON could not be parsed")]
    InvalidJson,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ApiError {
    /// Stable code reported to callers and used as the metric label
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest => "BAD_REQUEST",
            ApiError::InvalidJson => "INVALID_JSON",
            ApiError::Store(_) => "DB_ERROR",
            ApiError::Upload(_) => "UPLOAD_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        metrics::counter!("requests.failed", "code" => self.code()).increment(1);

        match self {
            ApiError::BadRequest => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "no file" })),
            )
                .into_response(),
            ApiError::InvalidJson => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "INVALID_JSON" })),
            )
                .into_response(),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": other.code() })),
            )
                .into_response(),
        }
    }
}
