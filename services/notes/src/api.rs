use crate::config::Settings;
use crate::error::{ApiError, UploadError};
use crate::note_store::{Note, NoteStore};
use crate::storage::{UploadBackend, UploadDescriptor, UploadedFile};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Multipart field that carries the upload
pub const UPLOAD_FIELD: &str = "file";

/// Content type recorded when a file part declares none
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub notes: Arc<dyn NoteStore>,
    pub uploads: Arc<dyn UploadBackend>,
}

/// Health/config response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    /// Configured storage mode, as given
    pub storage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<DatabaseInfo>,
}

/// Database details exposed by the health endpoint. Never includes the password.
#[derive(Debug, Serialize)]
pub struct DatabaseInfo {
    pub host: String,
    pub name: String,
    pub user: String,
    pub ssl: bool,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/notes", get(list_notes).post(create_note))
        // Uploads are not size limited
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint, reports the effective configuration
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let settings = &state.settings;

    let db = settings.service.health_expose_db.then(|| DatabaseInfo {
        host: settings.database.host.clone(),
        name: settings.database.name.clone(),
        user: settings.database.user.clone(),
        ssl: settings.database.requires_encrypted_transport,
    });

    Json(HealthResponse {
        ok: true,
        storage: settings.storage.mode.clone(),
        db,
    })
}

/// List notes, newest first
#[instrument(skip(state))]
async fn list_notes(State(state): State<AppState>) -> Result<Json<Vec<Note>>, ApiError> {
    let notes = state.notes.list_notes().await.map_err(|e| {
        error!(error = %e, "Error in GET /notes");
        ApiError::from(e)
    })?;

    Ok(Json(notes))
}

/// Create a note from `{ "body": ... }`.
///
/// Requests that are not declared as JSON, or carry no body, create an empty
/// note. A body declared as JSON that does not parse is rejected.
#[instrument(skip(state, headers, payload))]
async fn create_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<Note>, ApiError> {
    let body = if is_json(&headers) && !payload.is_empty() {
        let Json(value) = Json::<Value>::from_bytes(&payload).map_err(|e| {
            warn!(error = %e, "Malformed JSON in POST /notes");
            ApiError::InvalidJson
        })?;
        note_body(&value)
    } else {
        None
    };

    let note = state.notes.create_note(body).await.map_err(|e| {
        error!(error = %e, "Error in POST /notes");
        ApiError::from(e)
    })?;

    Ok(Json(note))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

/// Text to store for a parsed request body.
///
/// Only an object's `body` field counts. Falsy values (`null`, `false`, `0`,
/// `""`) mean no body; other non-string values are stored as their JSON text.
fn note_body(value: &Value) -> Option<String> {
    match value.get("body")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Accept one file under [`UPLOAD_FIELD`] and hand it to the configured backend
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadDescriptor>, ApiError> {
    let multipart = multipart.map_err(|e| {
        warn!(error = %e, "Upload request is not multipart");
        ApiError::BadRequest
    })?;

    let file = read_upload(multipart).await?.ok_or(ApiError::BadRequest)?;

    let descriptor = state.uploads.persist(file).await.map_err(|e| {
        error!(error = %e, "Error in POST /upload");
        ApiError::from(e)
    })?;

    Ok(Json(descriptor))
}

/// Pull the first file part named [`UPLOAD_FIELD`] out of the form.
///
/// A part without a file name is a plain form value and is skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Failed to read multipart field");
        ApiError::BadRequest
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // The file is present; failing to read it is an upload failure
        let bytes = field.bytes().await.map_err(|e| {
            error!(error = %e, "Error in POST /upload");
            ApiError::from(UploadError::from(e))
        })?;

        return Ok(Some(UploadedFile {
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}

/// Bind `0.0.0.0:PORT` and serve until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port: u16 = state
        .settings
        .port
        .parse()
        .with_context(|| format!("Invalid listen port {:?}", state.settings.port))?;
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!(
        address = %addr,
        storage = %state.settings.storage.mode,
        db_host = %state.settings.database.host,
        ssl = state.settings.database.requires_encrypted_transport,
        "Notes API listening"
    );

    let router = create_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
