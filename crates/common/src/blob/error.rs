use std::time::Duration;

use crate::crypto::SecretError;

use super::ops::Op;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Malformed path, or a sequence segment that is not an index
    #[error("invalid pointer '{pointer}': {reason}")]
    InvalidPointer {
        pointer: String,
        reason: &'static str,
    },
    /// The target is protected (the identity vault root)
    #[error("forbidden target '{0}'")]
    ForbiddenTarget(String),
    #[error("{op} at '{pointer}' expects {expected}")]
    TypeMismatch {
        op: Op,
        pointer: String,
        expected: &'static str,
    },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Valid decryption, but the envelope does not describe an operation
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
    /// Wrong key or corrupt ciphertext
    #[error("decryption failed: {0}")]
    Decryption(String),
    /// Valid decryption, but the plaintext is not a JSON document
    #[error("malformed document: {0}")]
    MalformedDocument(#[source] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] SecretError),
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("consolidation skipped: {failed} patch(es) failed to replay")]
    ConsolidationSkipped { failed: usize },
    #[error("blob has not been loaded")]
    NotLoaded,
    #[error("blob failed to decrypt and can no longer be used")]
    Failed,
}

impl BlobError {
    pub(crate) fn invalid_pointer(pointer: impl ToString, reason: &'static str) -> Self {
        BlobError::InvalidPointer {
            pointer: pointer.to_string(),
            reason,
        }
    }

    /// Whether this error came from the pointer resolver or the patch engine
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BlobError::InvalidPointer { .. }
                | BlobError::ForbiddenTarget(_)
                | BlobError::TypeMismatch { .. }
                | BlobError::UnsupportedOperation(_)
                | BlobError::MalformedPatch(_)
        )
    }
}
