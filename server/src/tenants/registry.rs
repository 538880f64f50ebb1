//! Tenant Session Registry
//!
//! Owns the per-tenant runtime state (fetch limiter and webhook HTTP client).
//! Sessions are created lazily on first use and removed through [`TenantRegistry::evict`]
//! when the tenant is deleted, so the map only grows with the account count.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::limiter::{LimiterError, TenantLimiter, DEFAULT_FETCH_LIMIT};

/// Settings applied to every newly created session.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Ceiling on simultaneous preview fetches per tenant.
    pub fetch_limit: usize,
    /// Timeout for webhook requests sent with the tenant's client.
    pub webhook_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            webhook_timeout: Duration::from_secs(30),
        }
    }
}

/// Runtime state owned by exactly one tenant.
#[derive(Debug)]
pub struct TenantSession {
    pub limiter: TenantLimiter,
    pub http: reqwest::Client,
}

/// Thread-safe registry of tenant sessions.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    sessions: DashMap<String, Arc<TenantSession>>,
    config: RegistryConfig,
}

impl TenantRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    fn build_session(&self, tenant_id: &str) -> TenantSession {
        let http = reqwest::Client::builder()
            .timeout(self.config.webhook_timeout)
            .build()
            .unwrap_or_else(|e| {
                error!(tenant_id = %tenant_id, error = %e, "Failed to build tenant HTTP client, using defaults");
                reqwest::Client::new()
            });

        TenantSession {
            limiter: TenantLimiter::new(self.config.fetch_limit),
            http,
        }
    }

    /// Get the tenant's session, creating it on first use.
    pub fn session(&self, tenant_id: &str) -> Arc<TenantSession> {
        if let Some(existing) = self.sessions.get(tenant_id) {
            return Arc::clone(existing.value());
        }

        let session = self
            .sessions
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                debug!(tenant_id = %tenant_id, "Creating tenant session");
                Arc::new(self.build_session(tenant_id))
            });
        Arc::clone(session.value())
    }

    /// HTTP client dedicated to the tenant's webhook traffic.
    pub fn http_client(&self, tenant_id: &str) -> reqwest::Client {
        self.session(tenant_id).http.clone()
    }

    /// Acquire one of the tenant's preview fetch slots.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        deadline: Instant,
    ) -> Result<OwnedSemaphorePermit, LimiterError> {
        let session = self.session(tenant_id);
        session.limiter.acquire(deadline).await
    }

    /// Drop the tenant's session. Returns `true` if one existed.
    ///
    /// Pending waiters on the old limiter fail with [`LimiterError::Closed`];
    /// permits already handed out stay valid until dropped.
    pub fn evict(&self, tenant_id: &str) -> bool {
        match self.sessions.remove(tenant_id) {
            Some((_, session)) => {
                session.limiter.close();
                info!(tenant_id = %tenant_id, "Tenant session evicted");
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
