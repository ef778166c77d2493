use crate::config::StorageKind;
use crate::error::UploadError;
use crate::storage::{UploadBackend, UploadDescriptor, UploadedFile};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use uuid::Uuid;

/// Stores uploads as files in a single directory.
///
/// Files are named with a random hex id and kept forever; nothing here
/// deletes them.
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    /// Create the backend, creating `dir` and its parents if missing
    pub async fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        info!(dir = %dir.display(), "Local upload directory ready");

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl UploadBackend for LocalBackend {
    #[instrument(skip(self, file), fields(original_name = %file.original_name))]
    async fn persist(&self, file: UploadedFile) -> Result<UploadDescriptor, UploadError> {
        let path = self.dir.join(Uuid::new_v4().simple().to_string());

        // A failed write leaves whatever was written in place
        fs::write(&path, &file.bytes).await?;

        info!(
            path = %path.display(),
            size_bytes = file.bytes.len(),
            "Upload stored on disk"
        );
        metrics::counter!("uploads.stored", "backend" => "local").increment(1);

        Ok(UploadDescriptor::Local {
            path: path.display().to_string(),
        })
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            original_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_persist_writes_identical_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(tmp.path()).await.unwrap();

        let content = b"\x89PNG\r\n\x1a\nnot really a png";
        let descriptor = backend.persist(png(content)).await.unwrap();

        let UploadDescriptor::Local { path } = descriptor else {
            panic!("expected a local descriptor");
        };
        assert!(Path::new(&path).starts_with(tmp.path()));
        assert_eq!(std::fs::read(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_same_name_gets_distinct_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(tmp.path()).await.unwrap();

        let first = backend.persist(png(b"one")).await.unwrap();
        let second = backend.persist(png(b"two")).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_new_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("uploads");

        LocalBackend::new(&dir).await.unwrap();
        let backend = LocalBackend::new(&dir).await.unwrap();
        assert_eq!(backend.dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_write_failure_is_upload_error() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(tmp.path().join("uploads")).await.unwrap();
        std::fs::remove_dir(backend.dir()).unwrap();

        let err = backend.persist(png(b"data")).await.unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
    }
}
