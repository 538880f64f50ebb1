//! Tenants
//!
//! A tenant is an account owning a webhook configuration, an optional
//! encrypted signing key, and its own fetch budget and HTTP client.

pub mod limiter;
pub mod registry;

pub use limiter::{LimiterError, TenantLimiter};
pub use registry::{RegistryConfig, TenantRegistry, TenantSession};

use crate::crypto::EncryptedSecret;
use crate::events;

/// Tenant configuration as loaded from storage.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Opaque user identifier.
    pub id: String,
    /// Instance name, forwarded as `instanceName`.
    pub name: String,
    /// Webhook endpoint, if the tenant has one.
    pub webhook_url: Option<String>,
    /// Event kinds the tenant receives (`All` matches everything).
    pub subscribed_events: Vec<String>,
    /// Encrypted HMAC signing key.
    pub hmac_key: Option<EncryptedSecret>,
}

impl Tenant {
    /// Whether the tenant wants `kind` delivered to its webhook.
    pub fn wants(&self, kind: &str) -> bool {
        self.webhook_url.as_deref().is_some_and(|u| !u.is_empty())
            && events::subscribes(&self.subscribed_events, kind)
    }
}
