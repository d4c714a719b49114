use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Where an object lives inside the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// Person images supplied by callers
    Upload,
    /// Generated try-on images
    Result,
}

impl BlobKind {
    fn prefix(self) -> &'static str {
        match self {
            BlobKind::Upload => "uploads",
            BlobKind::Result => "results",
        }
    }
}

/// A presigned PUT the client can use to upload directly to the bucket.
#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub key: String,
    pub public_url: String,
    pub expires_in: u32,
}

/// Durable object storage for images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` and return a URL it can be retrieved from.
    async fn put(
        &self,
        kind: BlobKind,
        data: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn presign_upload(
        &self,
        file_name: &str,
        expiry_secs: u32,
    ) -> Result<PresignedUpload, StorageError>;
}

/// Client for S3-compatible object storage (AWS S3, R2, MinIO).
pub struct S3BlobStore {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
        public_base_url: Option<&str>,
    ) -> Result<Self, StorageError> {
        let s3_region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse::<Region>()
                .map_err(|e| StorageError::Config(e.to_string()))?,
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(bucket_name, s3_region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        let public_base_url = match (public_base_url, endpoint) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(endpoint)) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name)
            }
            (None, None) => format!("https://{}.s3.{}.amazonaws.com", bucket_name, region),
        };

        Ok(Self {
            bucket,
            public_base_url,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        kind: BlobKind,
        data: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(kind, name, chrono::Utc::now().timestamp_millis());
        let response = self
            .bucket
            .put_object_with_content_type(&key, data, content_type)
            .await?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status { key, status });
        }

        tracing::debug!(key = %key, bytes = data.len(), "Stored object");
        Ok(self.public_url(&key))
    }

    async fn presign_upload(
        &self,
        file_name: &str,
        expiry_secs: u32,
    ) -> Result<PresignedUpload, StorageError> {
        let key = object_key(
            BlobKind::Upload,
            file_name,
            chrono::Utc::now().timestamp_millis(),
        );
        let upload_url = self
            .bucket
            .presign_put(&key, expiry_secs, None, None)
            .await?;

        Ok(PresignedUpload {
            upload_url,
            public_url: self.public_url(&key),
            key,
            expires_in: expiry_secs,
        })
    }
}

/// `<prefix>/<millis>_<sanitized name>`
pub fn object_key(kind: BlobKind, name: &str, timestamp_millis: i64) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}/{}_{}", kind.prefix(), timestamp_millis, safe)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Upload of {key} rejected with status {status}")]
    Status { key: String, status: u16 },

    #[error("Storage configuration error: {0}")]
    Config(String),
}
