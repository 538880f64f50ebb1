//! Webhook Secret Handling
//!
//! AES-256-GCM storage encryption for per-tenant HMAC keys and the
//! HMAC-SHA256 signing applied to outgoing webhook bodies.

pub mod signing;
pub mod vault;

pub use vault::{EncryptedSecret, KeyVault, VaultError};
