//! Event Engine
//!
//! Turns inbound chat events into webhook deliveries: resolves the tenant,
//! filters by subscription, enriches messages with a link preview, then
//! delivers to the tenant's webhook and the global endpoint.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::db::TenantStore;
use crate::events::MESSAGE_EVENT;
use crate::media::{self, MediaStore};
use crate::preview::LinkPreviewer;
use crate::tenants::{Tenant, TenantRegistry};
use crate::webhooks::payload::{INSTANCE_NAME_FIELD, JSON_DATA_FIELD, USER_ID_FIELD};
use crate::webhooks::{DeliveryError, DeliveryReceipt, WebhookDispatcher, WebhookPayload, WebhookTarget};

/// Key under which the preview is merged into the event data.
pub const LINK_PREVIEW_FIELD: &str = "linkPreview";

/// An event produced by the messaging client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body, for message events.
    #[serde(default)]
    pub message_text: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Why a delivery was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownTenant,
    LookupFailed,
    NotSubscribed,
    NotConfigured,
}

/// Result of one delivery.
#[derive(Debug)]
pub enum Delivery {
    Delivered(DeliveryReceipt),
    Skipped(SkipReason),
    Failed(DeliveryError),
}

impl Delivery {
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    fn from_result(result: Result<DeliveryReceipt, DeliveryError>) -> Self {
        match result {
            Ok(receipt) => Self::Delivered(receipt),
            Err(e) => Self::Failed(e),
        }
    }
}

/// What happened to an event.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub tenant: Delivery,
    pub global: Delivery,
    pub preview_attached: bool,
}

impl DispatchOutcome {
    const fn dropped(reason: SkipReason) -> Self {
        Self {
            tenant: Delivery::Skipped(reason),
            global: Delivery::Skipped(reason),
            preview_attached: false,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an event may wait for its link preview.
    pub preview_deadline: Duration,
    pub global_webhook_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_deadline: Duration::from_secs(5),
            global_webhook_url: None,
        }
    }
}

struct Prepared {
    tenant: Tenant,
    fields: BTreeMap<String, String>,
    wanted: bool,
    preview_attached: bool,
}

pub struct EventEngine {
    store: Arc<dyn TenantStore>,
    registry: Arc<TenantRegistry>,
    previewer: LinkPreviewer,
    dispatcher: WebhookDispatcher,
    media_store: Option<Arc<dyn MediaStore>>,
    config: EngineConfig,
}

impl EventEngine {
    pub fn new(
        store: Arc<dyn TenantStore>,
        registry: Arc<TenantRegistry>,
        previewer: LinkPreviewer,
        dispatcher: WebhookDispatcher,
        media_store: Option<Arc<dyn MediaStore>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            previewer,
            dispatcher,
            media_store,
            config,
        }
    }

    pub const fn previewer(&self) -> &LinkPreviewer {
        &self.previewer
    }

    pub const fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    /// Process one event. Never fails; the outcome records what happened.
    #[tracing::instrument(skip(self, event), fields(tenant_id = %event.tenant_id, kind = %event.kind))]
    pub async fn handle(&self, event: InboundEvent) -> DispatchOutcome {
        let prepared = match self.prepare(event).await {
            Ok(p) => p,
            Err(reason) => return DispatchOutcome::dropped(reason),
        };

        let payload =
            WebhookPayload::build(self.dispatcher.format(), prepared.fields, &prepared.tenant.id);
        let target = WebhookTarget::for_tenant(&prepared.tenant).filter(|_| prepared.wanted);

        // A slow tenant endpoint must not hold up the global broadcast
        let (tenant, global) = tokio::join!(
            async {
                match &target {
                    Some(target) => {
                        Delivery::from_result(self.dispatcher.deliver(target, &payload).await)
                    }
                    None => Delivery::Skipped(SkipReason::NotSubscribed),
                }
            },
            self.deliver_global(&payload),
        );

        DispatchOutcome {
            tenant,
            global,
            preview_attached: prepared.preview_attached,
        }
    }

    /// Process an event whose media was saved to `file_path`; the tenant
    /// receives it as a multipart upload.
    #[tracing::instrument(skip(self, event), fields(tenant_id = %event.tenant_id, kind = %event.kind))]
    pub async fn handle_with_attachment(&self, event: InboundEvent, file_path: &Path) -> DispatchOutcome {
        let prepared = match self.prepare(event).await {
            Ok(p) => p,
            Err(reason) => return DispatchOutcome::dropped(reason),
        };

        let Prepared {
            tenant: account,
            fields,
            wanted,
            preview_attached,
        } = prepared;
        let payload = WebhookPayload::build(self.dispatcher.format(), fields.clone(), &account.id);
        let target = WebhookTarget::for_tenant(&account).filter(|_| wanted);

        let (tenant, global) = tokio::join!(
            async {
                match &target {
                    Some(target) => Delivery::from_result(
                        self.dispatcher
                            .deliver_file(target, fields, file_path)
                            .await,
                    ),
                    None => Delivery::Skipped(SkipReason::NotSubscribed),
                }
            },
            self.deliver_global(&payload),
        );

        DispatchOutcome {
            tenant,
            global,
            preview_attached,
        }
    }

    /// Drop all runtime state for a deleted tenant.
    pub fn tenant_deleted(&self, tenant_id: &str) -> bool {
        self.registry.evict(tenant_id)
    }

    /// Upload outgoing media to object storage when the tenant asks for it.
    /// `None` means the caller should send the media as base64.
    pub async fn outgoing_media(
        &self,
        tenant_id: &str,
        chat_jid: &str,
        message_id: &str,
        data: Vec<u8>,
        mime_type: &str,
        file_name: Option<&str>,
    ) -> Option<Map<String, Value>> {
        media::process_outgoing_media(
            self.store.as_ref(),
            self.media_store.as_deref(),
            tenant_id,
            chat_jid,
            message_id,
            data,
            mime_type,
            file_name,
        )
        .await
    }

    async fn prepare(&self, event: InboundEvent) -> Result<Prepared, SkipReason> {
        let tenant = match self.store.find_tenant(&event.tenant_id).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                warn!("Event for unknown tenant dropped");
                return Err(SkipReason::UnknownTenant);
            }
            Err(e) => {
                error!(error = %e, "Tenant lookup failed, event dropped");
                return Err(SkipReason::LookupFailed);
            }
        };

        let wanted = tenant.wants(&event.kind);
        if !wanted && self.config.global_webhook_url.is_none() {
            debug!("Tenant not subscribed to event");
            return Err(SkipReason::NotSubscribed);
        }

        let mut data = event.data;
        let mut preview_attached = false;
        if event.kind == MESSAGE_EVENT {
            if let Some(text) = event.message_text.as_deref().filter(|t| !t.is_empty()) {
                let deadline = Instant::now() + self.config.preview_deadline;
                if let Some(preview) = self
                    .previewer
                    .extract_and_enrich(text, &tenant.id, deadline)
                    .await
                {
                    data.insert(LINK_PREVIEW_FIELD.to_string(), preview.to_json());
                    preview_attached = true;
                }
            }
        }

        let json_data = json!({ "type": event.kind, "event": data });
        let mut fields = BTreeMap::new();
        fields.insert(JSON_DATA_FIELD.to_string(), json_data.to_string());
        fields.insert(USER_ID_FIELD.to_string(), tenant.id.clone());
        fields.insert(INSTANCE_NAME_FIELD.to_string(), tenant.name.clone());

        Ok(Prepared {
            tenant,
            fields,
            wanted,
            preview_attached,
        })
    }

    async fn deliver_global(&self, payload: &WebhookPayload) -> Delivery {
        match self.config.global_webhook_url.as_deref() {
            Some(url) => Delivery::from_result(self.dispatcher.deliver_global(url, payload).await),
            None => Delivery::Skipped(SkipReason::NotConfigured),
        }
    }
}
