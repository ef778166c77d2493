use crate::config::{StorageKind, StorageSettings};
use crate::error::UploadError;
use crate::storage::{UploadBackend, UploadDescriptor, UploadedFile};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use tracing::{debug, info, instrument};

/// Object-store backend: one `PutObject` per upload
pub struct S3Backend {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    /// Create a client from the ambient AWS configuration
    ///
    /// Credentials and region come from the default provider chain. The bucket
    /// is not checked here; a bad bucket fails on the first upload.
    pub async fn new(config: &StorageSettings) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Self::from_client(S3Client::from_conf(s3_config_builder.build()), config)
    }

    /// Use an already configured client
    pub fn from_client(client: S3Client, config: &StorageSettings) -> Self {
        info!(
            bucket = %config.bucket,
            prefix = %config.prefix,
            "S3 upload backend initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        }
    }
}

/// Object key for an upload: `{prefix}{unix_millis}-{original_name}`.
///
/// Two uploads with the same name in the same millisecond get the same key.
pub fn object_key(prefix: &str, unix_millis: i64, original_name: &str) -> String {
    format!("{prefix}{unix_millis}-{original_name}")
}

#[async_trait]
impl UploadBackend for S3Backend {
    #[instrument(skip(self, file), fields(bucket = %self.bucket, original_name = %file.original_name))]
    async fn persist(&self, file: UploadedFile) -> Result<UploadDescriptor, UploadError> {
        let key = object_key(&self.prefix, Utc::now().timestamp_millis(), &file.original_name);

        debug!(
            key = %key,
            size_bytes = file.bytes.len(),
            "Uploading file to S3"
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(file.bytes))
            .content_type(&file.mime_type)
            .send()
            .await
            .map_err(|e| UploadError::ObjectStore {
                bucket: self.bucket.clone(),
                key: key.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        info!(key = %key, "File uploaded successfully");
        metrics::counter!("uploads.stored", "backend" => "s3").increment(1);

        Ok(UploadDescriptor::ObjectStore {
            bucket: self.bucket.clone(),
            key,
        })
    }

    fn kind(&self) -> StorageKind {
        StorageKind::ObjectStore
    }
}
