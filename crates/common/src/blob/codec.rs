//! Serialize-then-encrypt helpers for everything a blob keeps sealed
//!
//! All ciphertexts are standard base64 over the [`Secret`] envelope. Failures
//! to decode or authenticate surface as [`BlobError::Decryption`]; a payload
//! that decrypts but does not parse is reported separately so callers can
//! tell a wrong key from a corrupt patch.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::crypto::{KeyPurpose, Secret};

use super::error::BlobError;
use super::patch::Operation;

pub fn encrypt_document(key: &Secret, document: &Value) -> Result<String, BlobError> {
    let bytes = serde_json::to_vec(document).map_err(BlobError::MalformedDocument)?;
    seal(key, &bytes)
}

pub fn decrypt_document(key: &Secret, ciphertext: &str) -> Result<Value, BlobError> {
    let bytes = open(key, ciphertext)?;
    serde_json::from_slice(&bytes).map_err(BlobError::MalformedDocument)
}

/// Encrypt the `[code, pointer, ...params]` envelope of an operation
pub fn encrypt_patch(key: &Secret, operation: &Operation) -> Result<String, BlobError> {
    let bytes = serde_json::to_vec(&operation.to_envelope())
        .map_err(|e| BlobError::MalformedPatch(e.to_string()))?;
    seal(key, &bytes)
}

pub fn decrypt_patch(key: &Secret, ciphertext: &str) -> Result<Operation, BlobError> {
    let bytes = open(key, ciphertext)?;
    let envelope: Value =
        serde_json::from_slice(&bytes).map_err(|e| BlobError::MalformedPatch(e.to_string()))?;
    Operation::from_envelope(&envelope)
}

/// Encrypt the blob's secret field under its own unlock key
pub fn encrypt_secret(unlock_key: &Secret, secret: &[u8]) -> Result<String, BlobError> {
    seal(unlock_key, secret)
}

pub fn decrypt_secret(unlock_key: &Secret, ciphertext: &str) -> Result<Vec<u8>, BlobError> {
    open(unlock_key, ciphertext)
}

/// Wrap the blob key under a key derived from the master secret, so the blob
///  can be recovered without the login credentials.
pub fn wrap_blob_key(master_secret: &[u8], blob_key: &Secret) -> Result<String, BlobError> {
    let recovery = Secret::derive(master_secret, KeyPurpose::Recovery);
    seal(&recovery, blob_key.bytes())
}

pub fn unwrap_blob_key(master_secret: &[u8], wrapped: &str) -> Result<Secret, BlobError> {
    let recovery = Secret::derive(master_secret, KeyPurpose::Recovery);
    let bytes = open(&recovery, wrapped)?;
    Secret::from_slice(&bytes).map_err(|e| BlobError::Decryption(e.to_string()))
}

/// Strings are sealed as-is, anything else as its JSON text
pub(crate) fn encrypt_value(key: &Secret, value: &Value) -> Result<String, BlobError> {
    match value {
        Value::String(text) => seal(key, text.as_bytes()),
        other => {
            let bytes = serde_json::to_vec(other).map_err(BlobError::MalformedDocument)?;
            seal(key, &bytes)
        }
    }
}

/// Two-stage decode: the plaintext is parsed as JSON, and kept as a raw
///  string if that fails.
pub(crate) fn decrypt_value(key: &Secret, ciphertext: &str) -> Result<Value, BlobError> {
    let bytes = open(key, ciphertext)?;
    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        return Ok(value);
    }
    Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

fn seal(key: &Secret, plaintext: &[u8]) -> Result<String, BlobError> {
    Ok(STANDARD.encode(key.encrypt(plaintext)?))
}

fn open(key: &Secret, ciphertext: &str) -> Result<Vec<u8>, BlobError> {
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| BlobError::Decryption(format!("invalid base64: {}", e)))?;
    key.decrypt(&raw)
        .map_err(|e| BlobError::Decryption(e.to_string()))
}
