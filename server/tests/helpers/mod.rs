//! Reusable test helpers for engine and HTTP integration tests.
//!
//! Provides an in-memory [`TenantStore`], an engine builder wired to it, and
//! `TestApp` for sending requests through the axum router with
//! `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat};
use tower::ServiceExt;

use relay_server::api::{create_router, AppState};
use relay_server::crypto::KeyVault;
use relay_server::db::{StoreError, TenantStore};
use relay_server::engine::{EngineConfig, EventEngine};
use relay_server::media::MediaSettings;
use relay_server::preview::{LinkPreviewer, PreviewConfig};
use relay_server::tenants::{RegistryConfig, Tenant, TenantRegistry};
use relay_server::webhooks::{DeliveryFormat, WebhookDispatcher};

pub const MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Tenants held in memory.
#[derive(Default)]
pub struct MemoryTenantStore {
    tenants: Mutex<HashMap<String, Tenant>>,
    media: Mutex<HashMap<String, MediaSettings>>,
}

impl MemoryTenantStore {
    pub fn insert(&self, tenant: Tenant) {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.id.clone(), tenant);
    }

    pub fn set_media(&self, tenant_id: &str, settings: MediaSettings) {
        self.media
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), settings);
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.lock().unwrap().get(tenant_id).cloned())
    }

    async fn media_settings(&self, tenant_id: &str) -> Result<MediaSettings, StoreError> {
        self.media
            .lock()
            .unwrap()
            .get(tenant_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(tenant_id.to_string()))
    }
}

/// Knobs for [`build_engine`].
pub struct EngineOptions {
    pub format: DeliveryFormat,
    pub fetch_limit: usize,
    pub preview_deadline: Duration,
    pub global_webhook_url: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            format: DeliveryFormat::Json,
            fetch_limit: 20,
            preview_deadline: Duration::from_secs(5),
            global_webhook_url: None,
        }
    }
}

pub fn vault() -> KeyVault {
    KeyVault::new(Some(MASTER_KEY))
}

/// Engine backed by `store`, with real HTTP clients.
pub fn build_engine(store: Arc<MemoryTenantStore>, options: EngineOptions) -> Arc<EventEngine> {
    let registry = Arc::new(TenantRegistry::new(RegistryConfig {
        fetch_limit: options.fetch_limit,
        webhook_timeout: Duration::from_secs(5),
    }));

    let previewer = LinkPreviewer::new(PreviewConfig::default(), Arc::clone(&registry))
        .expect("Failed to build previewer");
    let dispatcher = WebhookDispatcher::new(
        Arc::new(vault()),
        Arc::clone(&registry),
        options.format,
        Duration::from_secs(5),
    )
    .expect("Failed to build dispatcher");

    Arc::new(EventEngine::new(
        store,
        registry,
        previewer,
        dispatcher,
        None,
        EngineConfig {
            preview_deadline: options.preview_deadline,
            global_webhook_url: options.global_webhook_url,
        },
    ))
}

/// Tenant subscribed to `events`, with an optional plaintext HMAC key.
pub fn tenant(id: &str, webhook_url: &str, events: &[&str], hmac_key: Option<&[u8]>) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: format!("{id}-instance"),
        webhook_url: Some(webhook_url.to_string()),
        subscribed_events: events.iter().map(|e| (*e).to_string()).collect(),
        hmac_key: hmac_key.map(|k| vault().encrypt(k).expect("Failed to encrypt key")),
    }
}

/// Encoded PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf.into_inner()
}

/// Router wrapper for HTTP tests.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryTenantStore>,
    pub engine: Arc<EventEngine>,
}

impl TestApp {
    pub fn new(options: EngineOptions) -> Self {
        let store = Arc::new(MemoryTenantStore::default());
        let engine = build_engine(Arc::clone(&store), options);
        let router = create_router(AppState::new(Arc::clone(&engine)));
        Self {
            router,
            store,
            engine,
        }
    }

    /// Build a request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

/// Parse a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
