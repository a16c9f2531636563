//! Cryptographic primitives for blobvault
//!
//! - **Encryption**: ChaCha20-Poly1305 with an integrity hash, see [`Secret`]
//! - **Key derivation**: BLAKE3 `derive_key`, one context per [`KeyPurpose`]
//!
//! The blob document, every patch, and each encrypted identity field are
//! sealed with a [`Secret`]. The blob's own secret field and the recovery
//! wrapping of the blob key use separately derived keys, so they can be
//! rotated independently of the document key.

mod secret;

pub use secret::{KeyPurpose, Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
