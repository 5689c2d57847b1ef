use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::{Path, PathBuf};

/// Object storage boundary for job inputs and results.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` into `scratch_dir`, named by the key's final path segment.
    async fn fetch(&self, key: &str, scratch_dir: &Path) -> Result<PathBuf, StorageError>;

    /// Upload a local file under `key` and return the key.
    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError>;
}

/// Client for S3 or any S3-compatible object store.
pub struct S3Gateway {
    bucket: Box<Bucket>,
}

impl S3Gateway {
    pub fn new(
        bucket_name: &str,
        region_name: &str,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self, StorageError> {
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region_name.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region_name
                .parse::<Region>()
                .map_err(|e| StorageError::Config(e.to_string()))?,
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }

    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }
}

#[async_trait]
impl ObjectStore for S3Gateway {
    async fn fetch(&self, key: &str, scratch_dir: &Path) -> Result<PathBuf, StorageError> {
        let local_path = scratch_dir.join(file_name_for(key)?);
        tokio::fs::create_dir_all(scratch_dir).await?;

        tracing::info!(bucket = %self.bucket.name(), key = %key, "Downloading object");
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        check_status(key, response.status_code())?;

        // Write under a unique name first so a reader never sees a partial file
        let partial = scratch_dir.join(format!(".{}.part", uuid::Uuid::new_v4()));
        tokio::fs::write(&partial, response.bytes()).await?;
        tokio::fs::rename(&partial, &local_path).await?;

        tracing::info!(key = %key, path = %local_path.display(), "Downloaded object");
        Ok(local_path)
    }

    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        let data = tokio::fs::read(local_path).await?;
        let content_type = content_type_for(local_path);

        tracing::info!(
            bucket = %self.bucket.name(),
            key = %key,
            bytes = data.len(),
            content_type,
            "Uploading object"
        );
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(StorageError::S3)?;
        check_status(key, response.status_code())?;

        Ok(key.to_string())
    }
}

/// Local file name for an object key: its last non-empty path segment.
pub fn file_name_for(key: &str) -> Result<&str, StorageError> {
    match key.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(StorageError::InvalidKey(key.to_string())),
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn check_status(key: &str, status: u16) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        403 => Err(StorageError::AccessDenied(key.to_string())),
        _ => Err(StorageError::Status {
            key: key.to_string(),
            status,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied to object: {0}")]
    AccessDenied(String),

    #[error("Object store returned status {status} for {key}")]
    Status { key: String, status: u16 },

    #[error("Object key has no file name: {0:?}")]
    InvalidKey(String),

    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
