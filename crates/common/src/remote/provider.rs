use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Everything the remote holds for a blob: the last consolidated snapshot and
///  the encrypted patches appended since, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: u64,
    #[serde(default)]
    pub encrypted_secret: Option<String>,
    /// Encrypted document
    pub document: String,
    #[serde(default)]
    pub patches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSubmission {
    pub blob_id: String,
    /// Encrypted `[code, pointer, ...params]`
    pub patch: String,
    /// The revision this patch produces
    pub revision: u64,
    #[serde(skip)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSubmission {
    pub blob_id: String,
    /// Encrypted document
    pub document: String,
    pub revision: u64,
    #[serde(skip)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubmission {
    pub blob_id: String,
    /// Account name the blob is registered under
    pub account: String,
    /// Encrypted document at revision 0
    pub document: String,
    pub auth_secret: String,
    pub encrypted_secret: String,
    /// Blob key wrapped under the recovery key
    pub encrypted_blob_key: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(skip)]
    pub signature: Option<String>,
}

/// Re-keyed blob replacing the one currently registered for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUpdateSubmission {
    /// Id the blob is registered under before the update
    pub previous_id: String,
    pub blob_id: String,
    /// Document encrypted under the new blob key
    pub document: String,
    pub revision: u64,
    pub encrypted_secret: String,
    pub encrypted_blob_key: String,
    /// Made with the auth secret, over the previous id
    #[serde(skip)]
    pub signature: Option<String>,
}

/// What the remote hands back for an account recovery request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryBundle {
    pub blob_id: String,
    /// Blob key wrapped under the recovery key
    pub encrypted_blob_key: String,
    pub snapshot: Snapshot,
}

/// Acknowledgement from the remote. `revision` is the revision the remote
///  recorded, when it reports one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub revision: Option<u64>,
}

/// Request/response access to the remote blob store.
///
/// Implementations do not retry and do not enforce timeouts; the blob bounds
///  every call itself. Idempotency is not assumed.
#[async_trait]
pub trait BlobTransport: Send + Sync + Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current snapshot of a blob along with its pending patches
    async fn fetch_snapshot(&self, remote: &Url, id: &str) -> Result<Snapshot, Self::Error>;

    /// Append one encrypted patch to the blob's log
    async fn submit_patch(
        &self,
        remote: &Url,
        submission: PatchSubmission,
    ) -> Result<Ack, Self::Error>;

    /// Replace the blob's snapshot, allowing the remote to truncate every
    ///  patch at or below `submission.revision`
    async fn submit_snapshot(
        &self,
        remote: &Url,
        submission: SnapshotSubmission,
    ) -> Result<Ack, Self::Error>;

    /// Register a brand new blob
    async fn create_blob(
        &self,
        remote: &Url,
        submission: CreateSubmission,
    ) -> Result<Ack, Self::Error>;

    /// Fetch the wrapped key and snapshot of the blob registered for `account`
    async fn fetch_recovery(
        &self,
        remote: &Url,
        account: &str,
    ) -> Result<RecoveryBundle, Self::Error>;

    /// Replace the blob registered for `account` with a re-keyed one
    async fn update_keys(
        &self,
        remote: &Url,
        account: &str,
        submission: KeyUpdateSubmission,
    ) -> Result<Ack, Self::Error>;
}
