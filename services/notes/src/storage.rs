//! Upload persistence.
//!
//! Exactly one backend is chosen at startup from `STORAGE` and used for the
//! lifetime of the process. There is no fallback between backends.

use crate::config::{Settings, StorageKind};
use crate::error::UploadError;
use crate::local_storage::LocalBackend;
use crate::s3_uploader::S3Backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A single file taken from a multipart request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as sent by the client
    pub original_name: String,
    /// Declared content type
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Where an upload ended up. The `uploaded` tag tells the two shapes apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "uploaded")]
pub enum UploadDescriptor {
    #[serde(rename = "local")]
    Local { path: String },
    #[serde(rename = "s3")]
    ObjectStore { bucket: String, key: String },
}

/// Persist an upload and describe where it landed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadBackend: Send + Sync {
    async fn persist(&self, file: UploadedFile) -> Result<UploadDescriptor, UploadError>;

    fn kind(&self) -> StorageKind;
}

/// Construct the single backend for this process
pub async fn select_backend(settings: &Settings) -> Result<Arc<dyn UploadBackend>> {
    let backend: Arc<dyn UploadBackend> = match settings.storage.kind {
        StorageKind::Local => Arc::new(
            LocalBackend::new(&settings.storage.upload_dir)
                .await
                .context("Failed to prepare local upload directory")?,
        ),
        StorageKind::ObjectStore => Arc::new(S3Backend::new(&settings.storage).await),
    };

    info!(
        mode = %settings.storage.mode,
        backend = backend.kind().as_str(),
        "Upload backend selected"
    );

    Ok(backend)
}
