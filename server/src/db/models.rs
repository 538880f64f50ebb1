//! Database Models

use sqlx::FromRow;

use crate::crypto::EncryptedSecret;
use crate::media::{MediaDelivery, MediaSettings};
use crate::tenants::Tenant;

/// Tenant columns of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub webhook: Option<String>,
    /// Comma-separated event kinds.
    pub events: Option<String>,
    pub hmac_key: Option<Vec<u8>>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            webhook_url: row.webhook.filter(|w| !w.trim().is_empty()),
            subscribed_events: parse_event_list(row.events.as_deref().unwrap_or_default()),
            hmac_key: row
                .hmac_key
                .filter(|k| !k.is_empty())
                .map(EncryptedSecret::from_bytes),
        }
    }
}

/// Media columns of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct MediaSettingsRow {
    pub s3_enabled: Option<bool>,
    pub media_delivery: Option<String>,
}

impl From<MediaSettingsRow> for MediaSettings {
    fn from(row: MediaSettingsRow) -> Self {
        Self {
            s3_enabled: row.s3_enabled.unwrap_or(false),
            media_delivery: row
                .media_delivery
                .as_deref()
                .map(MediaDelivery::parse)
                .unwrap_or_default(),
        }
    }
}

/// Split a stored `a,b,c` subscription list.
pub fn parse_event_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
