//! Credential store for integration configuration blobs.
//!
//! Configurations carry URLs, headers, and credentials, so they are stored as
//! AES-256-GCM ciphertext bound to the owning integration id as additional
//! authenticated data. Payloads without the version marker are legacy
//! plaintext JSON and are returned as-is.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::adapters::IntegrationConfig;
use crate::models::integration::Model as IntegrationModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("payload is encrypted but no crypto key is configured")]
    MissingKey,
    #[error("configuration is not valid JSON: {0}")]
    InvalidConfig(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(CryptoKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version byte | nonce | ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes produced by [`encrypt_bytes`]
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let sealed = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(sealed.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(nonce, Payload { msg: sealed, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload carries the encrypted version marker
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.first() == Some(&VERSION_ENCRYPTED)
}

fn integration_aad(integration_id: Uuid) -> String {
    format!("integration|{integration_id}")
}

/// Source of decrypted integration configuration.
///
/// The sync engine holds the returned value only for the duration of one sync
/// and never logs it.
pub trait CredentialStore: Send + Sync {
    fn decrypt(&self, integration: &IntegrationModel) -> Result<IntegrationConfig, CryptoError>;
}

/// AES-256-GCM credential store. Without a key only legacy plaintext rows
/// can be read.
#[derive(Debug, Clone, Default)]
pub struct AesGcmCredentialStore {
    key: Option<CryptoKey>,
}

impl AesGcmCredentialStore {
    pub fn new(key: Option<CryptoKey>) -> Self {
        Self { key }
    }

    /// Build from raw key bytes as loaded by the config layer.
    pub fn from_config_key(bytes: Option<&[u8]>) -> Result<Self, CryptoError> {
        let key = bytes.map(|b| CryptoKey::new(b.to_vec())).transpose()?;
        Ok(Self { key })
    }

    /// Encrypt a configuration for storage on the given integration.
    pub fn encrypt_config(
        &self,
        integration_id: Uuid,
        config: &IntegrationConfig,
    ) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::MissingKey)?;
        let plaintext =
            serde_json::to_vec(config).map_err(|e| CryptoError::InvalidConfig(e.to_string()))?;
        encrypt_bytes(key, integration_aad(integration_id).as_bytes(), &plaintext)
    }
}

impl CredentialStore for AesGcmCredentialStore {
    fn decrypt(&self, integration: &IntegrationModel) -> Result<IntegrationConfig, CryptoError> {
        let blob = &integration.config_ciphertext;
        if blob.is_empty() {
            return Err(CryptoError::EmptyCiphertext);
        }

        let plaintext = if is_encrypted_payload(blob) {
            let key = self.key.as_ref().ok_or(CryptoError::MissingKey)?;
            decrypt_bytes(key, integration_aad(integration.id).as_bytes(), blob)?
        } else {
            blob.clone()
        };

        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidConfig(e.to_string()))
    }
}
