//! S3 Media Store
//!
//! Stores message media in any S3-compatible backend (AWS S3, MinIO, R2, B2)
//! and hands back a presigned download URL.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    config::{Credentials, IdentityCache, SharedCredentialsProvider, StalledStreamProtectionConfig},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{MediaError, MediaStore, MediaUpload};
use crate::config::Config;

#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    presign_expiry: Duration,
}

impl S3MediaStore {
    /// Build the client from configuration.
    ///
    /// Credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    /// A custom endpoint switches to path-style addressing.
    pub fn new(config: &Config) -> Self {
        let region = Region::new(
            std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(region)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .identity_cache(IdentityCache::no_cache());

        if let (Ok(access_key), Ok(secret_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "environment");
            builder = builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(
            bucket = %config.s3_bucket,
            endpoint = ?config.s3_endpoint,
            "S3 media store initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.s3_bucket.clone(),
            presign_expiry: Duration::from_secs(config.s3_presign_expiry),
        }
    }

    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), MediaError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| MediaError::Upload(e.to_string()))?;
        Ok(())
    }

    async fn presign_get(&self, key: &str) -> Result<String, MediaError> {
        let presign_config = PresigningConfig::builder()
            .expires_in(self.presign_expiry)
            .build()
            .map_err(|e| MediaError::Config(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| MediaError::Presign(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn process_media(&self, upload: MediaUpload) -> Result<Map<String, Value>, MediaError> {
        let key = object_key(&upload);
        let size = upload.data.len();

        self.upload(&key, upload.data, &upload.mime_type).await?;
        let url = self.presign_get(&key).await?;
        debug!(tenant_id = %upload.tenant_id, key = %key, size, "Media uploaded to S3");

        let mut fields = Map::new();
        fields.insert(
            "s3".to_string(),
            json!({
                "url": url,
                "key": key,
                "bucket": self.bucket,
                "size": size,
                "mimeType": upload.mime_type,
                "fileName": upload.file_name,
            }),
        );
        Ok(fields)
    }
}

/// `users/{tenant}/{inbox|outbox}/{chat}/{message_id}{.ext}`
pub fn object_key(upload: &MediaUpload) -> String {
    let direction = if upload.is_incoming { "inbox" } else { "outbox" };
    let extension = upload
        .file_name
        .as_deref()
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&upload.mime_type)
                .and_then(|exts| exts.first())
                .map(|ext| (*ext).to_string())
        });

    let mut key = format!(
        "users/{}/{}/{}/{}",
        segment(&upload.tenant_id),
        direction,
        segment(&upload.chat_jid),
        segment(&upload.message_id),
    );
    if let Some(ext) = extension {
        key.push('.');
        key.push_str(&ext);
    }
    key
}

fn segment(raw: &str) -> String {
    raw.replace(['/', '\\'], "_")
}
