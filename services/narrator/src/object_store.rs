use crate::config::S3Config;
use crate::error::{NarratorError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

/// An object written to the store, addressable without credentials
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Key within the bucket
    pub key: String,
    /// Public address of the object
    pub public_url: String,
    /// Payload size in bytes
    pub size_bytes: usize,
}

/// Blob storage with public-read addressing
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `key` with `data` and make it publicly readable.
    /// An existing object is never replaced: a taken key fails with
    /// [`NarratorError::ObjectExists`].
    async fn put_public(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<StoredObject>;

    /// Remove the object under `key`
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3 error codes answering a conditional write against an existing key
fn is_key_taken(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("PreconditionFailed") | Some("ConditionalRequestConflict")
    )
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    config: S3Config,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            public_read_acl = config.public_read_acl,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn acl(&self) -> Option<ObjectCannedAcl> {
        self.config
            .public_read_acl
            .then_some(ObjectCannedAcl::PublicRead)
    }

    fn if_none_match(&self) -> Option<String> {
        self.config.conditional_writes.then(|| "*".to_string())
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .set_acl(self.acl())
            .set_if_none_match(self.if_none_match())
            .send()
            .await
            .map_err(|e| {
                if is_key_taken(e.as_service_error().and_then(|se| se.code())) {
                    NarratorError::ObjectExists(key.to_string())
                } else {
                    NarratorError::ObjectStore(format!(
                        "failed to upload {}: {}",
                        key,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .set_acl(self.acl())
            .send()
            .await
            .map_err(|e| {
                NarratorError::ObjectStore(format!(
                    "failed to create multipart upload for {}: {}",
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let upload_id = create_response.upload_id().ok_or_else(|| {
            NarratorError::ObjectStore(format!("no upload ID returned for {}", key))
        })?;

        match self.finish_multipart(key, upload_id, data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Parts already stored are billed until the upload is aborted
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = %key,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    /// Upload every part, then complete without replacing an existing key
    async fn finish_multipart(&self, key: &str, upload_id: &str, data: &[u8]) -> Result<()> {
        let parts = self.upload_parts(key, upload_id, data).await?;

        self.client
            .complete_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .upload_id(upload_id)
            .set_if_none_match(self.if_none_match())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                if is_key_taken(e.as_service_error().and_then(|se| se.code())) {
                    NarratorError::ObjectExists(key.to_string())
                } else {
                    NarratorError::ObjectStore(format!(
                        "failed to complete multipart upload for {}: {}",
                        key,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        Ok(())
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        data: &[u8],
    ) -> Result<Vec<CompletedPart>> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in data.chunks(self.config.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let response = self
                .client
                .upload_part()
                .bucket(&self.config.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    NarratorError::ObjectStore(format!(
                        "failed to upload part {} of {}: {}",
                        part_number,
                        key,
                        DisplayErrorContext(&e)
                    ))
                })?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put_public(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject> {
        let size_bytes = data.len();

        debug!(key = %key, content_type = %content_type, "Uploading object to S3");

        if size_bytes > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, &data, content_type).await?;
        } else {
            self.simple_upload(key, data, content_type).await?;
        }

        let public_url = public_url(&self.config, key);

        info!(key = %key, size_bytes = size_bytes, "Object uploaded successfully");

        Ok(StoredObject {
            key: key.to_string(),
            public_url,
            size_bytes,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                NarratorError::ObjectStore(format!(
                    "failed to delete {}: {}",
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(key = %key, "Object deleted from S3");
        Ok(())
    }
}

/// Public address of `key` in the configured bucket
pub fn public_url(config: &S3Config, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }

    match config.endpoint_url {
        Some(ref endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            match endpoint.split_once("://") {
                Some((scheme, host)) if !config.force_path_style => {
                    format!("{}://{}.{}/{}", scheme, config.bucket, host, key)
                }
                _ => format!("{}/{}/{}", endpoint, config.bucket, key),
            }
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}
