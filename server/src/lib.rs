//! Relay Server
//!
//! Multi-tenant chat event dispatch: per-tenant webhooks with optional HMAC
//! signing, link preview enrichment, and S3 media delivery.

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod events;
pub mod media;
pub mod preview;
pub mod tenants;
pub mod webhooks;
