//! Symmetric encryption using ChaCha20-Poly1305
//!
//! Every ciphertext produced here is `nonce (12 bytes) || encrypted(hash(32) || plaintext) || tag (16 bytes)`.
//! The BLAKE3 hash of the plaintext travels inside the AEAD envelope and is checked again
//! after decryption, so a wrong key or a corrupted payload can never surface as plaintext.

use std::ops::Deref;

use chacha20poly1305::Key;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of BLAKE3 hash in bytes (256 bits)
pub const BLAKE3_HASH_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
    /// Authentication failed: wrong key, truncated or tampered ciphertext
    #[error("decryption failed: {0}")]
    Decrypt(&'static str),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// What a derived key is used for
///
/// Each purpose maps to a distinct BLAKE3 `derive_key` context, so the same
/// passphrase material never yields the same key for two purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Encrypts the blob document and its patches
    Crypt,
    /// Encrypts the blob's secret field
    Unlock,
    /// Wraps the blob key for account recovery
    Recovery,
    /// Keys request signatures
    Signing,
}

impl KeyPurpose {
    fn context(&self) -> &'static str {
        match self {
            KeyPurpose::Crypt => "blobvault 2024-06-01 blob crypt key",
            KeyPurpose::Unlock => "blobvault 2024-06-01 secret unlock key",
            KeyPurpose::Recovery => "blobvault 2024-06-01 recovery wrapping key",
            KeyPurpose::Signing => "blobvault 2024-06-01 request signing key",
        }
    }
}

/// A 256-bit symmetric key
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::derive(b"correct horse battery staple", KeyPurpose::Crypt);
/// let ciphertext = secret.encrypt(b"sensitive data")?;
/// let recovered = secret.decrypt(&ciphertext)?;
/// assert_eq!(b"sensitive data", &recovered[..]);
/// ```
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Secret([u8; SECRET_SIZE]);

impl Default for Secret {
    fn default() -> Self {
        Secret([0; SECRET_SIZE])
    }
}

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Derive a key from passphrase material for a single purpose
    pub fn derive(material: &[u8], purpose: KeyPurpose) -> Self {
        Self(blake3::derive_key(purpose.context(), material))
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, SecretError> {
        let bytes = hex::decode(hex_str.trim())?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt data using ChaCha20-Poly1305 AEAD
    ///
    /// A random nonce is generated for each call, so encrypting the same
    /// plaintext twice yields different ciphertexts.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let plaintext_hash = blake3::hash(data);

        let mut data_with_hash = Vec::with_capacity(BLAKE3_HASH_SIZE + data.len());
        data_with_hash.extend_from_slice(plaintext_hash.as_bytes());
        data_with_hash.extend_from_slice(data);

        let key = Key::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data_with_hash.as_ref())
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Decrypt data using ChaCha20-Poly1305 AEAD
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Decrypt`] if:
    /// - Data is too short to contain a nonce
    /// - Authentication tag verification fails (data was tampered with or wrong key)
    /// - Decrypted data is too short to contain the hash header
    /// - Hash verification fails (data corruption)
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(SecretError::Decrypt("data too short for nonce"));
        }

        let key = Key::from_slice(self.bytes());
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(key);
        let decrypted = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| SecretError::Decrypt("authentication failed"))?;

        if decrypted.len() < BLAKE3_HASH_SIZE {
            return Err(SecretError::Decrypt("decrypted data too short for hash header"));
        }

        let stored_hash = &decrypted[..BLAKE3_HASH_SIZE];
        let plaintext = &decrypted[BLAKE3_HASH_SIZE..];

        let computed_hash = blake3::hash(plaintext);
        if stored_hash != computed_hash.as_bytes() {
            return Err(SecretError::Decrypt("hash verification failed"));
        }

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_encrypt_decrypt() {
        let secret = Secret::generate();
        let data = b"hello world, this is a test message for encryption";

        let encrypted = secret.encrypt(data).unwrap();
        let decrypted = secret.decrypt(&encrypted).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_secret_size_validation() {
        let too_short = [1u8; 16];
        let too_long = [1u8; 64];

        assert!(Secret::from_slice(&too_short).is_err());
        assert!(Secret::from_slice(&too_long).is_err());

        let just_right = [1u8; SECRET_SIZE];
        assert!(Secret::from_slice(&just_right).is_ok());
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let secret = Secret::generate();
        let other = Secret::generate();
        let encrypted = secret.encrypt(b"payload").unwrap();

        assert!(matches!(
            other.decrypt(&encrypted),
            Err(SecretError::Decrypt(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret = Secret::generate();
        let mut encrypted = secret.encrypt(b"test data for integrity check").unwrap();
        encrypted[NONCE_SIZE + 10] ^= 0xFF;

        assert!(secret.decrypt(&encrypted).is_err());
        assert!(secret.decrypt(&encrypted[..4]).is_err());
    }

    #[test]
    fn test_derive_is_deterministic_per_purpose() {
        let a = Secret::derive(b"passphrase", KeyPurpose::Crypt);
        let b = Secret::derive(b"passphrase", KeyPurpose::Crypt);
        let c = Secret::derive(b"passphrase", KeyPurpose::Unlock);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_round_trip() {
        let secret = Secret::generate();
        let parsed = Secret::from_hex(&secret.to_hex()).unwrap();
        assert_eq!(secret, parsed);
        assert!(Secret::from_hex("zz").is_err());
    }

    #[test]
    fn test_empty_data_encryption() {
        let secret = Secret::generate();
        let encrypted = secret.encrypt(b"").unwrap();
        let decrypted = secret.decrypt(&encrypted).unwrap();

        assert!(decrypted.is_empty());
    }
}
