use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use url::Url;

use super::provider::{
    Ack, BlobTransport, CreateSubmission, KeyUpdateSubmission, PatchSubmission, RecoveryBundle,
    Snapshot, SnapshotSubmission,
};

/// In-memory blob store, for tests and offline use
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<RwLock<MemoryTransportInner>>,
}

#[derive(Debug, Default)]
struct MemoryTransportInner {
    blobs: HashMap<String, StoredBlob>,
    /// Account name to the id of its blob
    accounts: HashMap<String, String>,
    /// While set, every call fails with `Offline`
    offline: bool,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    revision: u64,
    encrypted_secret: Option<String>,
    document: String,
    /// Patches since the snapshot, tagged with the revision they produce
    patches: Vec<(u64, String)>,
    encrypted_blob_key: Option<String>,
    last_signature: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryTransportError {
    #[error("memory transport error: {0}")]
    Internal(String),
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob already exists: {0}")]
    AlreadyExists(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("remote is offline")]
    Offline,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot as if it had been created remotely
    pub fn seed(&self, id: &str, snapshot: Snapshot) {
        if let Ok(mut inner) = self.inner.write() {
            let base = snapshot.revision;
            inner.blobs.insert(
                id.to_string(),
                StoredBlob {
                    revision: snapshot.revision,
                    encrypted_secret: snapshot.encrypted_secret,
                    document: snapshot.document,
                    patches: snapshot
                        .patches
                        .into_iter()
                        .zip(1..)
                        .map(|(patch, n)| (base + n, patch))
                        .collect(),
                    encrypted_blob_key: None,
                    last_signature: None,
                },
            );
        }
    }

    /// Append a raw patch, bypassing any client
    pub fn append_patch(&self, id: &str, patch: impl Into<String>) -> Result<(), MemoryTransportError> {
        let mut inner = self.write()?;
        let blob = inner
            .blobs
            .get_mut(id)
            .ok_or_else(|| MemoryTransportError::NotFound(id.to_string()))?;
        let revision = blob.revision + blob.patches.len() as u64 + 1;
        blob.patches.push((revision, patch.into()));
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.offline = offline;
        }
    }

    /// What a fresh fetch would currently return
    pub fn stored(&self, id: &str) -> Option<Snapshot> {
        let inner = self.inner.read().ok()?;
        inner.blobs.get(id).map(StoredBlob::to_snapshot)
    }

    /// Id of the blob registered for `account`
    pub fn account_blob(&self, account: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner.accounts.get(account).cloned()
    }

    pub fn last_signature(&self, id: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner.blobs.get(id)?.last_signature.clone()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, MemoryTransportInner>, MemoryTransportError> {
        let inner = self.inner.read().map_err(|e| {
            MemoryTransportError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        if inner.offline {
            return Err(MemoryTransportError::Offline);
        }
        Ok(inner)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, MemoryTransportInner>, MemoryTransportError> {
        let inner = self.inner.write().map_err(|e| {
            MemoryTransportError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        if inner.offline {
            return Err(MemoryTransportError::Offline);
        }
        Ok(inner)
    }
}

impl StoredBlob {
    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            encrypted_secret: self.encrypted_secret.clone(),
            document: self.document.clone(),
            patches: self.patches.iter().map(|(_, patch)| patch.clone()).collect(),
        }
    }
}

#[async_trait]
impl BlobTransport for MemoryTransport {
    type Error = MemoryTransportError;

    async fn fetch_snapshot(&self, _remote: &Url, id: &str) -> Result<Snapshot, Self::Error> {
        let inner = self.read()?;
        inner
            .blobs
            .get(id)
            .map(StoredBlob::to_snapshot)
            .ok_or_else(|| MemoryTransportError::NotFound(id.to_string()))
    }

    async fn submit_patch(
        &self,
        _remote: &Url,
        submission: PatchSubmission,
    ) -> Result<Ack, Self::Error> {
        let mut inner = self.write()?;
        let blob = inner
            .blobs
            .get_mut(&submission.blob_id)
            .ok_or_else(|| MemoryTransportError::NotFound(submission.blob_id.clone()))?;
        blob.patches.push((submission.revision, submission.patch));
        blob.last_signature = submission.signature;
        Ok(Ack {
            revision: Some(submission.revision),
        })
    }

    async fn submit_snapshot(
        &self,
        _remote: &Url,
        submission: SnapshotSubmission,
    ) -> Result<Ack, Self::Error> {
        let mut inner = self.write()?;
        let blob = inner
            .blobs
            .get_mut(&submission.blob_id)
            .ok_or_else(|| MemoryTransportError::NotFound(submission.blob_id.clone()))?;

        // A late or duplicate snapshot never rolls the blob back
        if submission.revision >= blob.revision {
            blob.revision = submission.revision;
            blob.document = submission.document;
            blob.patches
                .retain(|(revision, _)| *revision > submission.revision);
            blob.last_signature = submission.signature;
        }
        Ok(Ack {
            revision: Some(blob.revision),
        })
    }

    async fn create_blob(
        &self,
        _remote: &Url,
        submission: CreateSubmission,
    ) -> Result<Ack, Self::Error> {
        let mut inner = self.write()?;
        if inner.blobs.contains_key(&submission.blob_id) {
            return Err(MemoryTransportError::AlreadyExists(submission.blob_id));
        }
        if inner.accounts.contains_key(&submission.account) {
            return Err(MemoryTransportError::AlreadyExists(submission.account));
        }
        inner
            .accounts
            .insert(submission.account, submission.blob_id.clone());
        inner.blobs.insert(
            submission.blob_id,
            StoredBlob {
                revision: 0,
                encrypted_secret: Some(submission.encrypted_secret),
                document: submission.document,
                patches: vec![],
                encrypted_blob_key: Some(submission.encrypted_blob_key),
                last_signature: submission.signature,
            },
        );
        Ok(Ack { revision: Some(0) })
    }

    async fn fetch_recovery(
        &self,
        _remote: &Url,
        account: &str,
    ) -> Result<RecoveryBundle, Self::Error> {
        let inner = self.read()?;
        let blob_id = inner
            .accounts
            .get(account)
            .ok_or_else(|| MemoryTransportError::NotFound(account.to_string()))?;
        let blob = inner
            .blobs
            .get(blob_id)
            .ok_or_else(|| MemoryTransportError::NotFound(blob_id.clone()))?;
        let encrypted_blob_key = blob.encrypted_blob_key.clone().ok_or_else(|| {
            MemoryTransportError::NotFound(format!("recovery key for {}", account))
        })?;
        Ok(RecoveryBundle {
            blob_id: blob_id.clone(),
            encrypted_blob_key,
            snapshot: blob.to_snapshot(),
        })
    }

    async fn update_keys(
        &self,
        _remote: &Url,
        account: &str,
        submission: KeyUpdateSubmission,
    ) -> Result<Ack, Self::Error> {
        let mut inner = self.write()?;
        let registered = inner
            .accounts
            .get(account)
            .ok_or_else(|| MemoryTransportError::NotFound(account.to_string()))?;
        if *registered != submission.previous_id {
            return Err(MemoryTransportError::Rejected(format!(
                "{} is not registered for {}",
                submission.previous_id, account
            )));
        }
        if submission.blob_id != submission.previous_id
            && inner.blobs.contains_key(&submission.blob_id)
        {
            return Err(MemoryTransportError::AlreadyExists(submission.blob_id));
        }

        inner.blobs.remove(&submission.previous_id);
        inner
            .accounts
            .insert(account.to_string(), submission.blob_id.clone());
        inner.blobs.insert(
            submission.blob_id,
            StoredBlob {
                revision: submission.revision,
                encrypted_secret: Some(submission.encrypted_secret),
                document: submission.document,
                patches: vec![],
                encrypted_blob_key: Some(submission.encrypted_blob_key),
                last_signature: submission.signature,
            },
        );
        Ok(Ack {
            revision: Some(submission.revision),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Url {
        Url::parse("http://localhost:8080").unwrap()
    }

    fn seeded() -> MemoryTransport {
        let transport = MemoryTransport::new();
        transport.seed(
            "blob",
            Snapshot {
                revision: 3,
                encrypted_secret: None,
                document: "doc".to_string(),
                patches: vec![],
            },
        );
        transport
    }

    #[tokio::test]
    async fn test_patches_accumulate_in_order() {
        let transport = seeded();
        for (revision, patch) in [(4, "p4"), (5, "p5")] {
            transport
                .submit_patch(
                    &remote(),
                    PatchSubmission {
                        blob_id: "blob".to_string(),
                        patch: patch.to_string(),
                        revision,
                        signature: None,
                    },
                )
                .await
                .unwrap();
        }
        let snapshot = transport.fetch_snapshot(&remote(), "blob").await.unwrap();
        assert_eq!(snapshot.revision, 3);
        assert_eq!(snapshot.patches, vec!["p4", "p5"]);
    }

    #[tokio::test]
    async fn test_snapshot_truncates_log() {
        let transport = seeded();
        transport.append_patch("blob", "p4").unwrap();
        transport.append_patch("blob", "p5").unwrap();

        let ack = transport
            .submit_snapshot(
                &remote(),
                SnapshotSubmission {
                    blob_id: "blob".to_string(),
                    document: "doc@4".to_string(),
                    revision: 4,
                    signature: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.revision, Some(4));

        let snapshot = transport.stored("blob").unwrap();
        assert_eq!(snapshot.document, "doc@4");
        assert_eq!(snapshot.patches, vec!["p5"]);
    }

    #[tokio::test]
    async fn test_late_snapshot_is_ignored() {
        let transport = seeded();
        let ack = transport
            .submit_snapshot(
                &remote(),
                SnapshotSubmission {
                    blob_id: "blob".to_string(),
                    document: "stale".to_string(),
                    revision: 1,
                    signature: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.revision, Some(3));
        assert_eq!(transport.stored("blob").unwrap().document, "doc");
    }

    #[tokio::test]
    async fn test_offline_and_missing() {
        let transport = seeded();
        assert!(matches!(
            transport.fetch_snapshot(&remote(), "nope").await,
            Err(MemoryTransportError::NotFound(_))
        ));
        transport.set_offline(true);
        assert!(matches!(
            transport.fetch_snapshot(&remote(), "blob").await,
            Err(MemoryTransportError::Offline)
        ));
    }
}
