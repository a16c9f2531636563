//! Request signing
//!
//! The remote authenticates writes with a MAC keyed by the `auth_secret`
//! stored inside the (encrypted) document, so only holders of the blob key
//! can produce valid signatures.

use crate::crypto::{KeyPurpose, Secret};

/// Produces an opaque signature over an outgoing request payload
pub trait RequestSigner: Send + Sync {
    fn sign(&self, blob_id: &str, payload: &[u8]) -> String;
}

/// BLAKE3 keyed hash under a key derived from the document's auth secret
#[derive(Debug, Clone)]
pub struct HmacSigner {
    key: Secret,
}

impl HmacSigner {
    pub fn from_auth_secret(auth_secret: &str) -> Self {
        Self {
            key: Secret::derive(auth_secret.as_bytes(), KeyPurpose::Signing),
        }
    }

    pub fn verify(&self, blob_id: &str, payload: &[u8], signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(bytes) = <[u8; blake3::OUT_LEN]>::try_from(bytes.as_slice()) else {
            return false;
        };
        // blake3::Hash equality is constant time
        blake3::Hash::from(bytes) == self.mac(blob_id, payload)
    }

    fn mac(&self, blob_id: &str, payload: &[u8]) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(blob_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(payload);
        hasher.finalize()
    }
}

impl RequestSigner for HmacSigner {
    fn sign(&self, blob_id: &str, payload: &[u8]) -> String {
        self.mac(blob_id, payload).to_hex().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = HmacSigner::from_auth_secret("s3cret");
        let signature = signer.sign("blob-1", b"payload");

        assert!(signer.verify("blob-1", b"payload", &signature));
        assert!(!signer.verify("blob-2", b"payload", &signature));
        assert!(!signer.verify("blob-1", b"tampered", &signature));
        assert!(!HmacSigner::from_auth_secret("other").verify("blob-1", b"payload", &signature));
        assert!(!signer.verify("blob-1", b"payload", "zz"));
    }
}
