//! Blob storage for normalised images, previews and videos

use async_trait::async_trait;
use bytes::Bytes;
use momentwall_config::ObjectStorageConfig;
use rusoto_core::{request::HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_s3::{PutObjectRequest, S3Client, S3};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RelayError, RelayResult};

/// Accepts bytes under a relay-chosen key and returns a retrievable URL
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> RelayResult<String>;

    fn store_type(&self) -> &str;
}

/// Key layout: `events/<event>/<media>/<name>`
pub fn blob_key(event_id: &str, media_id: &str, name: &str) -> String {
    format!("events/{}/{}/{}", sanitize(event_id), sanitize(media_id), name)
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Files under a local directory, served by the relay at `/media`
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: format!("{}/media", public_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> RelayResult<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(RelayError::Storage(format!("refusing blob key {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> RelayResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        debug!(key = key, size = bytes.len(), "Blob written");
        Ok(format!("{}/{}", self.base_url, key))
    }

    fn store_type(&self) -> &str {
        "local"
    }
}

/// S3-compatible object storage
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    base_url: String,
}

impl S3BlobStore {
    pub fn new(config: &ObjectStorageConfig) -> RelayResult<Self> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        info!(
            endpoint = endpoint,
            bucket = config.bucket,
            "Initializing object storage client"
        );

        let credentials = StaticProvider::new_minimal(config.access_key.clone(), config.secret_key.clone());
        let region = Region::Custom {
            name: config.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: endpoint.clone(),
        };
        let http_client =
            HttpClient::new().map_err(|e| RelayError::Storage(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: S3Client::new_with(http_client, credentials, region),
            bucket: config.bucket.clone(),
            base_url: format!("{}/{}", endpoint, config.bucket),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> RelayResult<String> {
        let size = bytes.len();
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            body: Some(bytes.to_vec().into()),
            content_type: Some(content_type.to_string()),
            cache_control: Some("public, max-age=31536000".to_string()),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| RelayError::Storage(format!("Failed to upload {}: {}", key, e)))?;

        debug!(key = key, size, bucket = self.bucket, "Object uploaded");
        Ok(format!("{}/{}", self.base_url, key))
    }

    fn store_type(&self) -> &str {
        "s3"
    }
}
