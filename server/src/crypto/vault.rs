//! HMAC Key Vault
//!
//! Provides AES-GCM encryption for per-tenant webhook signing keys stored in
//! the database. The key size picks the variant: 16, 24 or 32 bytes for
//! AES-128, AES-192 or AES-256. Keys are never stored in plaintext; they are decrypted only
//! for the duration of a single signing call.

use std::fmt;

use aes_gcm::{
    aead::{consts::U12, rand_core::RngCore, Aead, KeyInit, OsRng},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use thiserror::Error;
use tracing::{error, warn};
use zeroize::Zeroizing;

use super::signing;

/// GCM nonce size in bytes.
pub const NONCE_LEN: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Cipher selected by master key length.
enum VaultCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl VaultCipher {
    fn new(key: &[u8]) -> VaultResult<Self> {
        let cipher = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Self::Aes128),
            24 => Aes192Gcm::new_from_slice(key).map(Self::Aes192),
            32 => Aes256Gcm::new_from_slice(key).map(Self::Aes256),
            other => {
                return Err(VaultError::CipherInit(format!(
                    "invalid key length (expected 16, 24 or 32 bytes, got {other})"
                )))
            }
        };
        cipher.map_err(|e| VaultError::CipherInit(e.to_string()))
    }

    fn encrypt(&self, nonce: &Nonce<U12>, plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes192(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
    }

    fn decrypt(&self, nonce: &Nonce<U12>, ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes192(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
    }
}

/// Vault errors.
///
/// Configuration, malformed input and tampering are separate variants so that
/// callers can tell a missing feature from a security incident.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Encryption key not configured")]
    KeyNotConfigured,

    #[error("Failed to initialise cipher: {0}")]
    CipherInit(String),

    #[error("Failed to generate nonce: {0}")]
    RandomSource(String),

    #[error("Ciphertext too short ({0} bytes)")]
    Truncated(usize),

    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,
}

impl VaultError {
    /// True for errors that indicate a corrupt or tampered ciphertext.
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Truncated(_) | Self::AuthenticationFailed)
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

/// An encrypted signing secret: `nonce(12) || ciphertext || tag(16)`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret(Vec<u8>);

impl EncryptedSecret {
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncryptedSecret {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Never print the blob itself.
impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedSecret(<{} bytes>)", self.0.len())
    }
}

/// Process-wide holder of the master encryption key.
#[derive(Clone, Default)]
pub struct KeyVault {
    master_key: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl KeyVault {
    /// Build a vault from the configured master key.
    ///
    /// A 64-character hex string is decoded to its 32 raw bytes; anything else
    /// is used as raw key material (16, 24 or 32 bytes). Length is checked when the cipher is built,
    /// so a bad key surfaces as [`VaultError::CipherInit`] at use time rather
    /// than preventing startup.
    pub fn new(master_key: Option<&str>) -> Self {
        let master_key = master_key.filter(|k| !k.is_empty()).map(|raw| {
            let bytes = if raw.len() == 64 {
                hex::decode(raw).unwrap_or_else(|_| raw.as_bytes().to_vec())
            } else {
                raw.as_bytes().to_vec()
            };
            Zeroizing::new(bytes)
        });
        Self { master_key }
    }

    /// Whether a master key was supplied.
    pub const fn is_configured(&self) -> bool {
        self.master_key.is_some()
    }

    fn cipher(&self) -> VaultResult<VaultCipher> {
        let key = self.master_key.as_ref().ok_or(VaultError::KeyNotConfigured)?;
        VaultCipher::new(key)
    }

    /// Encrypt a plaintext secret under the master key.
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<EncryptedSecret> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| VaultError::RandomSource(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::CipherInit(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(EncryptedSecret(combined))
    }

    /// Decrypt a stored secret. The plaintext is wiped when dropped.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> VaultResult<Zeroizing<Vec<u8>>> {
        let cipher = self.cipher()?;

        let combined = secret.as_bytes();
        if combined.len() < NONCE_LEN {
            return Err(VaultError::Truncated(combined.len()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::AuthenticationFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Decrypt `secret` and return the hex HMAC-SHA256 of `payload` under it.
    pub fn try_sign(&self, payload: &[u8], secret: &EncryptedSecret) -> VaultResult<String> {
        let key = self.decrypt(secret)?;
        Ok(signing::sign_payload(&key, payload))
    }

    /// Sign `payload` if the tenant has a secret configured.
    ///
    /// Returns `None` when there is no secret, and also when signing fails;
    /// failures are logged and the webhook goes out unsigned.
    pub fn sign(&self, payload: &[u8], secret: Option<&EncryptedSecret>) -> Option<String> {
        let secret = secret.filter(|s| !s.is_empty())?;

        match self.try_sign(payload, secret) {
            Ok(signature) => Some(signature),
            Err(VaultError::KeyNotConfigured) => {
                warn!("Tenant has an HMAC key but no master key is configured, sending unsigned");
                None
            }
            Err(e) if e.is_integrity() => {
                error!(error = %e, "Stored HMAC key failed integrity check, sending unsigned");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to generate HMAC signature");
                None
            }
        }
    }
}
