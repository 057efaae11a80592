//! MinIO/S3 storage client for game state and published previews

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;

/// Opaque string storage: "store this string" / "retrieve this string"
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when nothing is stored under `key`
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Write-only sink for published sandbox documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_document(&self, key: &str, html: &str) -> Result<()>;
}

/// Key for a player's saved state of a game
pub fn state_key(game_id: &str, player_id: &str) -> String {
    format!("games/{}/state/{}.json", game_id, player_id)
}

/// S3/MinIO storage client
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    /// Create a new storage client from environment variables
    pub async fn from_env() -> Result<Self> {
        let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "localhost".into());
        let port = std::env::var("MINIO_PORT").unwrap_or_else(|_| "9000".into());
        let access_key = std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into());
        let secret_key = std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into());
        let bucket = std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "vibelab-games".into());
        let use_ssl = std::env::var("MINIO_USE_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let protocol = if use_ssl { "https" } else { "http" };
        let endpoint_url = format!("{}://{}:{}", protocol, endpoint, port);

        info!("Connecting to MinIO at {}", endpoint_url);

        let credentials = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(config);

        Ok(Self { client, bucket })
    }

    /// Download a file as string, `None` if the key does not exist
    pub async fn download_string(&self, key: &str) -> Result<Option<String>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to download {}", key)),
        };

        let data = response.body.collect().await?;
        let content = String::from_utf8(data.into_bytes().to_vec()).context("Invalid UTF-8 content")?;
        Ok(Some(content))
    }

    /// Upload a string with the given content type
    pub async fn upload_string(&self, key: &str, content: &str, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", key))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for StorageClient {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.download_string(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.upload_string(key, value, "application/json").await
    }
}

#[async_trait]
impl DocumentStore for StorageClient {
    async fn put_document(&self, key: &str, html: &str) -> Result<()> {
        self.upload_string(key, html, "text/html; charset=utf-8").await
    }
}
