//! R2 client implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult, TransferOp};
use crate::keys::{Locator, R2_SCHEME};
use crate::store::ObjectStore;

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
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
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn locator_for(&self, key: &str) -> String {
        format!("{}{}/{}", R2_SCHEME, self.bucket, key)
    }

    /// Resolve a locator to a key in this client's bucket.
    fn key_of<'a>(&self, locator: &'a str) -> StorageResult<&'a str> {
        match Locator::parse(locator)? {
            Locator::R2 { bucket, key } if bucket == self.bucket => Ok(key),
            Locator::Key(key) => Ok(key),
            _ => Err(StorageError::invalid_locator(locator)),
        }
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        debug!("Uploading {} bytes to {}", bytes.len(), key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::transfer(TransferOp::Put, key, e))?;

        info!(key, size, "Uploaded object");
        Ok(self.locator_for(key))
    }

    async fn get(&self, locator: &str) -> StorageResult<Vec<u8>> {
        let key = self.key_of(locator)?;
        debug!("Downloading {}", key);

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
                    StorageError::transfer(TransferOp::Get, key, e)
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::transfer(TransferOp::Get, key, e))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete(&self, locator: &str) -> StorageResult<()> {
        let key = self.key_of(locator)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::transfer(TransferOp::Delete, key, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn client() -> R2Client {
        R2Client::new(R2Config {
            endpoint_url: "https://example.r2.cloudflarestorage.com".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "vscore".to_string(),
            region: "auto".to_string(),
        })
    }

    #[test]
    fn test_locator_resolution() {
        let client = client();
        assert_eq!(client.locator_for("music/a.wav"), "r2://vscore/music/a.wav");
        assert_eq!(client.key_of("r2://vscore/music/a.wav").unwrap(), "music/a.wav");
        assert_eq!(client.key_of("music/a.wav").unwrap(), "music/a.wav");
        assert!(client.key_of("r2://other/music/a.wav").is_err());
        assert!(client.key_of("mem://music/a.wav").is_err());
    }

    #[test]
    #[serial]
    fn test_config_requires_credentials() {
        std::env::remove_var("R2_ENDPOINT_URL");
        let err = R2Config::from_env().unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
