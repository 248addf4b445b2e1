//! R2/S3-compatible implementation of the storage sink.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::sink::{extension_for, StorageSink};

/// Configuration for the object-store sink.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL objects are served from
    pub public_base_url: String,
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("STORAGE_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STORAGE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STORAGE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STORAGE_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("STORAGE_BUCKET_NAME not set"))?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .map_err(|_| StorageError::config_error("STORAGE_PUBLIC_BASE_URL not set"))?,
        })
    }
}

/// Object-store sink over an R2/S3-compatible API.
#[derive(Clone)]
pub struct ObjectStoreSink {
    client: Client,
    bucket: String,
    public_base_url: String,
    http: reqwest::Client,
}

impl ObjectStoreSink {
    /// Create a new sink from configuration.
    pub fn new(config: ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "adreel",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(ObjectStoreConfig::from_env()?))
    }

    /// Extract our object key from a public URL, if the URL is ours.
    fn key_for(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|key| !key.is_empty())
    }

    async fn download_object(&self, key: &str, dest: &Path) -> StorageResult<()> {
        debug!("downloading object {} to {}", key, dest.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn download_http(&self, url: &str, dest: &Path) -> StorageResult<()> {
        debug!("downloading {} to {}", url, dest.display());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::download_failed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageSink for ObjectStoreSink {
    async fn put(
        &self,
        data: Vec<u8>,
        folder: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let key = format!(
            "{}/{}.{}",
            folder.trim_matches('/'),
            uuid::Uuid::new_v4(),
            extension_for(content_type)
        );
        debug!("uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let url = format!("{}/{}", self.public_base_url, key);
        info!("uploaded {}", url);
        Ok(url)
    }

    async fn fetch(&self, url: &str, dest: &Path) -> StorageResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Our own URLs go through the S3 API; anything else (provider
        // transient URLs) is fetched over plain HTTP.
        match self.key_for(url) {
            Some(key) => self.download_object(&key, dest).await?,
            None => self.download_http(url, dest).await?,
        }

        Ok(dest.to_path_buf())
    }
}
