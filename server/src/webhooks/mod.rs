//! Webhooks
//!
//! HTTP POST delivery of chat events to tenant endpoints, with optional
//! HMAC signing and a global broadcast endpoint.

pub mod dispatch;
pub mod payload;

pub use dispatch::{DeliveryError, DeliveryReceipt, WebhookDispatcher, WebhookTarget};
pub use payload::{DeliveryFormat, WebhookPayload};
