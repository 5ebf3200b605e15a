//! Provider credential encryption using AES-256-GCM.
//!
//! Ciphertexts are `version(1) || nonce(12) || ciphertext+tag`, bound to the
//! owning provider row through additional authenticated data. Payloads without
//! the version marker are legacy plaintext and are passed through on read.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::adapters::ProviderCredentials;
use crate::models::ticketing_provider::Model as ProviderModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

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
    #[error("encrypted credentials present but no crypto key is configured")]
    MissingKey,
    #[error("credentials are not valid JSON: {0}")]
    InvalidCredentials(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

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

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    // Legacy plaintext has no version marker.
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Ok(ciphertext.to_vec());
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Serialize and encrypt credentials for storage on `provider`.
pub fn encrypt_provider_credentials(
    key: &CryptoKey,
    provider: &ProviderModel,
    credentials: &ProviderCredentials,
) -> Result<Vec<u8>, CryptoError> {
    let mut json = serde_json::to_vec(credentials)
        .map_err(|e| CryptoError::InvalidCredentials(e.to_string()))?;
    let result = encrypt_bytes(key, provider.credentials_aad().as_bytes(), &json);
    json.zeroize();
    result
}

/// Decrypt the stored credentials of `provider`.
///
/// Returns `Ok(None)` when the provider has no stored credentials. Legacy
/// plaintext JSON is accepted without a key; encrypted payloads require one.
pub fn decrypt_provider_credentials(
    key: Option<&CryptoKey>,
    provider: &ProviderModel,
) -> Result<Option<ProviderCredentials>, CryptoError> {
    let Some(stored) = provider.credentials_ciphertext.as_deref() else {
        return Ok(None);
    };
    if stored.is_empty() {
        return Ok(None);
    }

    let mut plaintext = if is_encrypted_payload(stored) {
        let key = key.ok_or(CryptoError::MissingKey)?;
        decrypt_bytes(key, provider.credentials_aad().as_bytes(), stored)?
    } else {
        stored.to_vec()
    };

    let parsed = serde_json::from_slice::<ProviderCredentials>(&plaintext)
        .map_err(|e| CryptoError::InvalidCredentials(e.to_string()));
    plaintext.zeroize();
    parsed.map(Some)
}
