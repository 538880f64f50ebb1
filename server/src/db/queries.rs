//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).

use sqlx::PgPool;
use tracing::error;

use super::models::{MediaSettingsRow, TenantRow};

/// Log and return a database error with context.
macro_rules! db_error {
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

/// Find a tenant by ID.
pub async fn find_tenant_by_id(pool: &PgPool, id: &str) -> sqlx::Result<Option<TenantRow>> {
    sqlx::query_as::<_, TenantRow>(
        "SELECT id, name, webhook, events, hmac_key FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("find_tenant_by_id", tenant_id = %id))
}

/// Read a tenant's media delivery flags.
pub async fn find_media_settings(
    pool: &PgPool,
    id: &str,
) -> sqlx::Result<Option<MediaSettingsRow>> {
    sqlx::query_as::<_, MediaSettingsRow>(
        "SELECT s3_enabled, media_delivery FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("find_media_settings", tenant_id = %id))
}
