//! S3-compatible storage client
//!
//! Provides object upload, deletion, and presigned URL generation for AWS S3
//! or any S3-compatible service (MinIO, R2, ...).
//!
//! Uses rust-s3 crate for lightweight S3 operations.

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::StorageConfig;
use crate::core::error::{AppError, Result};

/// Object storage operations needed by the upload pipeline and link manager
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key`
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Presigned GET URL for `key`, valid for `expires_in`
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;

    /// Remove the object stored under `key`
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3 storage client backed by a single bucket
pub struct S3Client {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Client {
    /// Create a new S3 client from configuration
    ///
    /// A configured endpoint switches to path-style addressing
    /// (http://endpoint/bucket instead of http://bucket.endpoint).
    pub fn new(config: StorageConfig) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Failed to create S3 credentials: {}", e)))?;

        let (region, path_style) = match config.endpoint {
            Some(endpoint) => (
                Region::Custom {
                    region: config.region.clone(),
                    endpoint,
                },
                true,
            ),
            None => (
                config.region.parse::<Region>().map_err(|e| {
                    AppError::Internal(format!("Invalid AWS region '{}': {}", config.region, e))
                })?,
                false,
            ),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AppError::Internal(format!("Failed to create S3 bucket handle: {}", e)))?;

        if path_style {
            bucket.set_path_style();
        }

        info!(
            "S3 client initialized for bucket: {}, region: {}, path_style: {}",
            bucket.name(),
            config.region,
            path_style
        );

        Ok(Self {
            bucket,
            region,
            credentials,
            path_style,
        })
    }

    /// Ensure the bucket exists, create if not
    ///
    /// Creation failures are logged and tolerated: the bucket commonly exists
    /// already or the credentials lack `CreateBucket`.
    pub async fn ensure_bucket_exists(&self) -> Result<()> {
        let bucket_config = BucketConfiguration::default();
        let created = if self.path_style {
            Bucket::create_with_path_style(
                &self.bucket.name(),
                self.region.clone(),
                self.credentials.clone(),
                bucket_config,
            )
            .await
        } else {
            Bucket::create(
                &self.bucket.name(),
                self.region.clone(),
                self.credentials.clone(),
                bucket_config,
            )
            .await
        };

        match created {
            Ok(response) if response.success() => {
                info!("Bucket '{}' created successfully", self.bucket.name());
            }
            Ok(response) => {
                debug!(
                    "Bucket '{}' not created (status {}), assuming it exists",
                    self.bucket.name(),
                    response.response_code
                );
            }
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                {
                    debug!("Bucket '{}' already exists", self.bucket.name());
                } else {
                    warn!(
                        "Could not create bucket '{}': {}. Assuming it exists.",
                        self.bucket.name(),
                        e
                    );
                }
            }
        }

        Ok(())
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }
}

/// rust-s3 is built without `fail-on-err`, so status codes are checked here
fn ensure_success(status: u16, action: &str, key: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(AppError::Storage(format!(
            "Failed to {} '{}': HTTP {}",
            action, key, status
        )))
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload file '{}': {}", key, e)))?;
        ensure_success(response.status_code(), "upload file", key)?;

        debug!(
            "Uploaded file '{}' ({} bytes) to bucket '{}'",
            key,
            data.len(),
            self.bucket.name()
        );
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let expiry_secs = u32::try_from(expires_in.as_secs()).map_err(|_| {
            AppError::Internal(format!("Presign expiry too large: {:?}", expires_in))
        })?;

        self.bucket
            .presign_get(key, expiry_secs, None)
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to generate presigned URL for '{}': {}",
                    key, e
                ))
            })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete file '{}': {}", key, e)))?;
        ensure_success(response.status_code(), "delete file", key)?;

        debug!(
            "Deleted file '{}' from bucket '{}'",
            key,
            self.bucket.name()
        );
        Ok(())
    }
}
