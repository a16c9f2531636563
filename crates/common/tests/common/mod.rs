//! Shared test utilities for blob integration tests
#![allow(dead_code)]

use common::blob::{encrypt_document, encrypt_patch, Blob, Operation};
use common::crypto::Secret;
use common::remote::{MemoryTransport, Snapshot};
use serde_json::Value;
use url::Url;

pub const BLOB_ID: &str = "test-blob";

pub fn remote() -> Url {
    Url::parse("http://localhost:8080").unwrap()
}

/// Seed `transport` with `document` at `revision` and a log of `patches`
pub fn seed(
    transport: &MemoryTransport,
    key: &Secret,
    revision: u64,
    document: &Value,
    patches: &[Operation],
) {
    let patches = patches
        .iter()
        .map(|op| encrypt_patch(key, op).unwrap())
        .collect();
    transport.seed(
        BLOB_ID,
        Snapshot {
            revision,
            encrypted_secret: None,
            document: encrypt_document(key, document).unwrap(),
            patches,
        },
    );
}

/// A blob loaded from a seeded in-memory remote with no pending patches
pub async fn setup_loaded_blob(document: Value) -> (Blob<MemoryTransport>, MemoryTransport, Secret) {
    let key = Secret::generate();
    let transport = MemoryTransport::new();
    seed(&transport, &key, 0, &document, &[]);

    let mut blob = Blob::new(remote(), BLOB_ID, key.clone(), transport.clone());
    blob.load().await.unwrap();
    (blob, transport, key)
}

pub fn op(envelope: Value) -> Operation {
    Operation::from_envelope(&envelope).unwrap()
}
