//! Webhook Dispatch
//!
//! Signs and POSTs payloads to tenant webhooks and the optional global
//! broadcast endpoint. Delivery is best-effort: each call makes exactly one
//! attempt and reports the outcome.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::payload::{DeliveryFormat, EncodeError, WebhookPayload};
use crate::crypto::signing::SIGNATURE_HEADER;
use crate::crypto::{EncryptedSecret, KeyVault};
use crate::tenants::{Tenant, TenantRegistry};

/// Form field naming the attached file.
pub const FILE_FIELD: &str = "file";

/// Longest response body kept in a [`DeliveryError::Status`].
const MAX_ERROR_BODY: usize = 1024;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] EncodeError),

    #[error("Webhook responded with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Failed to read attachment {path}: {message}")]
    File { path: String, message: String },
}

/// Where and how to deliver for one tenant.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub tenant_id: String,
    pub url: String,
    pub hmac_key: Option<EncryptedSecret>,
}

impl WebhookTarget {
    /// Target for `tenant`, if it has a webhook URL.
    pub fn for_tenant(tenant: &Tenant) -> Option<Self> {
        let url = tenant.webhook_url.as_deref().filter(|u| !u.is_empty())?;
        Some(Self {
            tenant_id: tenant.id.clone(),
            url: url.to_string(),
            hmac_key: tenant.hmac_key.clone(),
        })
    }
}

/// Successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub signed: bool,
}

pub struct WebhookDispatcher {
    vault: Arc<KeyVault>,
    registry: Arc<TenantRegistry>,
    format: DeliveryFormat,
    global_client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(
        vault: Arc<KeyVault>,
        registry: Arc<TenantRegistry>,
        format: DeliveryFormat,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let global_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            vault,
            registry,
            format,
            global_client,
        })
    }

    pub const fn format(&self) -> DeliveryFormat {
        self.format
    }

    /// Encode, sign and POST `payload` to the tenant's webhook.
    ///
    /// The signature covers exactly the bytes sent. No signature header is
    /// attached when the tenant has no key or signing fails.
    #[tracing::instrument(skip(self, target, payload), fields(tenant_id = %target.tenant_id, url = %target.url))]
    pub async fn deliver(
        &self,
        target: &WebhookTarget,
        payload: &WebhookPayload,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let body = payload.encode(self.format)?;
        let signature = self.vault.sign(&body.bytes, target.hmac_key.as_ref());

        let mut request = self
            .registry
            .http_client(&target.tenant_id)
            .post(&target.url)
            .header(reqwest::header::CONTENT_TYPE, body.content_type)
            .body(body.bytes);
        if let Some(sig) = &signature {
            request = request.header(SIGNATURE_HEADER, sig);
        }

        info!(format = %self.format, signed = signature.is_some(), "Sending webhook");
        send(request, signature.is_some()).await
    }

    /// POST `fields` plus the file at `file_path` as multipart form data.
    ///
    /// Multipart is used regardless of the configured format. The field map
    /// gains `file = <path>` and the signature covers its JSON encoding.
    #[tracing::instrument(skip(self, target, fields), fields(tenant_id = %target.tenant_id, url = %target.url))]
    pub async fn deliver_file(
        &self,
        target: &WebhookTarget,
        mut fields: BTreeMap<String, String>,
        file_path: &Path,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let path_str = file_path.to_string_lossy().into_owned();
        fields.insert(FILE_FIELD.to_string(), path_str.clone());

        let data = tokio::fs::read(file_path)
            .await
            .map_err(|e| DeliveryError::File {
                path: path_str.clone(),
                message: e.to_string(),
            })?;

        let signature = if target.hmac_key.is_some() {
            let json = serde_json::to_vec(&fields).map_err(EncodeError::from)?;
            self.vault.sign(&json, target.hmac_key.as_ref())
        } else {
            None
        };

        let file_name = file_path
            .file_name()
            .map_or_else(|| path_str.clone(), |n| n.to_string_lossy().into_owned());
        let mime = mime_guess::from_path(file_path).first_or_octet_stream();
        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .map_err(|e| DeliveryError::File {
                path: path_str.clone(),
                message: e.to_string(),
            })?;

        let mut form = multipart::Form::new();
        for (key, value) in fields {
            form = form.text(key, value);
        }
        form = form.part(FILE_FIELD, part);

        let mut request = self
            .registry
            .http_client(&target.tenant_id)
            .post(&target.url)
            .multipart(form);
        if let Some(sig) = &signature {
            request = request.header(SIGNATURE_HEADER, sig);
        }

        info!(file = %path_str, signed = signature.is_some(), "Sending webhook with attachment");
        send(request, signature.is_some()).await
    }

    /// POST `payload` unsigned to the global broadcast endpoint.
    #[tracing::instrument(skip(self, payload))]
    pub async fn deliver_global(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let body = payload.encode(self.format)?;
        let request = self
            .global_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, body.content_type)
            .body(body.bytes);

        debug!("Sending global webhook");
        send(request, false).await
    }
}

async fn send(request: reqwest::RequestBuilder, signed: bool) -> Result<DeliveryReceipt, DeliveryError> {
    let response = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "Webhook delivery failed");
            return Err(DeliveryError::Transport(e.to_string()));
        }
    };

    let status = response.status().as_u16();
    if response.status().is_success() {
        info!(status, "Webhook delivered");
        return Ok(DeliveryReceipt { status, signed });
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    warn!(status, body = %body, "Webhook rejected delivery");
    Err(DeliveryError::Status { status, body })
}
