//! Link Previews
//!
//! Finds the first URL in a message, fetches the page's title, description
//! and preview image, and shrinks the image to a JPEG thumbnail. Fetches are
//! bounded per tenant, coalesced per URL and cached for a few minutes.

pub mod cache;
pub mod extract;
pub mod fetch;
pub mod metadata;
pub mod thumbnail;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub use cache::PreviewCache;
pub use fetch::FetchError;
pub use thumbnail::{ThumbnailError, ThumbnailOptions};

use crate::tenants::TenantRegistry;

/// Preview of a linked page. Shared between coalesced callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPreview {
    pub title: String,
    pub description: String,
    /// JPEG thumbnail, if the page had a usable image.
    pub image: Option<Vec<u8>>,
}

impl LinkPreview {
    /// Wire representation merged into outgoing events as `linkPreview`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "title": self.title,
            "description": self.description,
            "thumbnail": self.image.as_deref().map(|img| STANDARD.encode(img)).unwrap_or_default(),
        })
    }
}

/// Errors produced while computing a preview. Cloned to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("Page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Preview fetch timed out")]
    Timeout,

    #[error("Preview computation panicked: {0}")]
    Panicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PreviewError {
    /// Internal faults, as opposed to ordinary network or content failures.
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Panicked(_) | Self::Internal(_))
    }
}

/// Preview limits and timings.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Budget for one full preview computation (page, image and thumbnail).
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub page_max_bytes: usize,
    pub image_max_bytes: usize,
    pub thumbnail: ThumbnailOptions,
    pub user_agent: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(600),
            page_max_bytes: 2 * 1024 * 1024,
            image_max_bytes: 10 * 1024 * 1024,
            thumbnail: ThumbnailOptions::default(),
            user_agent: concat!("relay-server/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Entry point for message enrichment.
#[derive(Clone)]
pub struct LinkPreviewer {
    client: reqwest::Client,
    cache: PreviewCache,
    registry: Arc<TenantRegistry>,
    config: Arc<PreviewConfig>,
}

impl LinkPreviewer {
    pub fn new(config: PreviewConfig, registry: Arc<TenantRegistry>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            cache: PreviewCache::new(config.cache_ttl, config.sweep_interval),
            registry,
            config: Arc::new(config),
        })
    }

    pub const fn cache(&self) -> &PreviewCache {
        &self.cache
    }

    /// Build a preview for the first URL in `text`.
    ///
    /// Returns `None` when the text has no URL, the tenant has no free fetch
    /// slot before `deadline`, or the preview cannot be produced in time.
    /// Failures never propagate to the caller.
    #[tracing::instrument(skip(self, text, deadline))]
    pub async fn extract_and_enrich(
        &self,
        text: &str,
        tenant_id: &str,
        deadline: Instant,
    ) -> Option<Arc<LinkPreview>> {
        let url = extract::first_url(text)?;

        let permit = match self.registry.acquire(tenant_id, deadline).await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(url = %url, error = %e, "No preview fetch slot available");
                return None;
            }
        };

        // The slot belongs to the computation and outlives this caller's deadline.
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let fetch_url = url.clone();
        let compute = move || async move {
            let _permit = permit;
            fetch_preview(client, fetch_url, config).await
        };

        match tokio::time::timeout_at(deadline, self.cache.get_or_fetch(&url, compute)).await {
            Ok(Ok(preview)) => Some(preview),
            Ok(Err(e)) if e.is_fault() => {
                error!(url = %url, error = %e, "Link preview failed");
                None
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Link preview unavailable");
                None
            }
            Err(_) => {
                warn!(url = %url, "Link preview not ready before deadline");
                None
            }
        }
    }
}

/// Fetch and assemble a preview. Runs detached inside the cache.
async fn fetch_preview(
    client: reqwest::Client,
    url: String,
    config: Arc<PreviewConfig>,
) -> Result<LinkPreview, PreviewError> {
    let work = async {
        let page = fetch::fetch_bytes(&client, &url, config.page_max_bytes).await?;
        let meta = metadata::parse(&String::from_utf8_lossy(&page));

        let image = match meta.image_ref.as_deref() {
            Some(image_ref) => fetch_image(&client, &url, image_ref, &config).await,
            None => None,
        };

        debug!(url = %url, has_image = image.is_some(), "Link preview fetched");
        Ok::<_, PreviewError>(LinkPreview {
            title: meta.title,
            description: meta.description,
            image,
        })
    };

    tokio::time::timeout(config.fetch_timeout, work)
        .await
        .unwrap_or(Err(PreviewError::Timeout))
}

/// Resolve, download and thumbnail the page image. Any failure drops the image only.
async fn fetch_image(
    client: &reqwest::Client,
    page_url: &str,
    image_ref: &str,
    config: &PreviewConfig,
) -> Option<Vec<u8>> {
    let image_url = match reqwest::Url::parse(page_url).and_then(|base| base.join(image_ref)) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        Ok(u) => {
            debug!(image_url = %u, "Skipping preview image with unsupported scheme");
            return None;
        }
        Err(e) => {
            warn!(image_ref = %image_ref, error = %e, "Invalid preview image URL");
            return None;
        }
    };

    let bytes = match fetch::fetch_bytes(client, image_url.as_str(), config.image_max_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(image_url = %image_url, error = %e, "Failed to fetch preview image");
            return None;
        }
    };

    let opts = config.thumbnail;
    match tokio::task::spawn_blocking(move || thumbnail::make_thumbnail(&bytes, &opts)).await {
        Ok(Ok(thumb)) => Some(thumb),
        Ok(Err(e)) => {
            warn!(image_url = %image_url, error = %e, "Failed to build thumbnail");
            None
        }
        // Surface decoder panics at the cache boundary.
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            error!(image_url = %image_url, error = %e, "Thumbnail task failed");
            None
        }
    }
}
