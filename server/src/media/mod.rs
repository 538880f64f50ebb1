//! Media Delivery
//!
//! Decides per tenant whether outgoing media is pushed to object storage or
//! left to the default base64 path.

pub mod s3;

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

pub use s3::S3MediaStore;

use crate::db::TenantStore;

/// Where a tenant wants media delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaDelivery {
    #[default]
    Base64,
    S3,
    Both,
}

impl MediaDelivery {
    /// Parse the stored setting. Unknown values mean base64.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "s3" => Self::S3,
            "both" => Self::Both,
            _ => Self::Base64,
        }
    }
}

impl FromStr for MediaDelivery {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Per-tenant media flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaSettings {
    pub s3_enabled: bool,
    pub media_delivery: MediaDelivery,
}

impl MediaSettings {
    /// Whether media should be uploaded to object storage.
    pub const fn uses_s3(&self) -> bool {
        self.s3_enabled && matches!(self.media_delivery, MediaDelivery::S3 | MediaDelivery::Both)
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to upload media: {0}")]
    Upload(String),

    #[error("Failed to generate presigned URL: {0}")]
    Presign(String),

    #[error("Media storage configuration error: {0}")]
    Config(String),
}

/// One media object to store.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub tenant_id: String,
    pub chat_jid: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
    /// Received (inbox) or sent (outbox).
    pub is_incoming: bool,
}

/// Object storage for message media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `upload` and return the fields to merge into the event.
    async fn process_media(&self, upload: MediaUpload) -> Result<Map<String, Value>, MediaError>;
}

/// Store outgoing media if the tenant has S3 delivery enabled.
///
/// Returns `None` when the media should go the default base64 way, including
/// when the settings cannot be read or the upload fails.
#[allow(clippy::too_many_arguments)]
pub async fn process_outgoing_media(
    store: &dyn TenantStore,
    media_store: Option<&dyn MediaStore>,
    tenant_id: &str,
    chat_jid: &str,
    message_id: &str,
    data: Vec<u8>,
    mime_type: &str,
    file_name: Option<&str>,
) -> Option<Map<String, Value>> {
    let settings = match store.media_settings(tenant_id).await {
        Ok(settings) => settings,
        Err(e) => {
            error!(tenant_id = %tenant_id, error = %e, "Failed to read media settings, using base64");
            MediaSettings::default()
        }
    };

    if !settings.uses_s3() {
        return None;
    }

    let Some(media_store) = media_store else {
        debug!(tenant_id = %tenant_id, "S3 delivery requested but no media store configured");
        return None;
    };

    let upload = MediaUpload {
        tenant_id: tenant_id.to_string(),
        chat_jid: chat_jid.to_string(),
        message_id: message_id.to_string(),
        data,
        mime_type: mime_type.to_string(),
        file_name: file_name.map(str::to_string),
        is_incoming: false,
    };

    match media_store.process_media(upload).await {
        Ok(fields) => Some(fields),
        Err(e) => {
            error!(tenant_id = %tenant_id, message_id = %message_id, error = %e, "Failed to upload media to S3");
            None
        }
    }
}
