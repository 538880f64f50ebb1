//! Database Layer
//!
//! `PostgreSQL` access to the tenant table, behind the [`TenantStore`] trait
//! so the event engine can run against other backends in tests.

mod models;
mod queries;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
pub use models::*;
pub use queries::*;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::media::MediaSettings;
use crate::tenants::Tenant;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Tenant not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Tenant lookups used by the event pipeline.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Load a tenant by ID. `Ok(None)` when it does not exist.
    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError>;

    /// Read the tenant's media delivery flags.
    async fn media_settings(&self, tenant_id: &str) -> Result<MediaSettings, StoreError>;
}

/// [`TenantStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(find_tenant_by_id(&self.pool, tenant_id)
            .await?
            .map(Tenant::from))
    }

    async fn media_settings(&self, tenant_id: &str) -> Result<MediaSettings, StoreError> {
        find_media_settings(&self.pool, tenant_id)
            .await?
            .map(MediaSettings::from)
            .ok_or_else(|| StoreError::NotFound(tenant_id.to_string()))
    }
}

/// Create `PostgreSQL` connection pool with health configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(2)
        .max_connections(20)
        // Prevent hanging requests on pool exhaustion
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}
