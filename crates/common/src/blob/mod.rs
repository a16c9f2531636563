//! An encrypted, versioned JSON document kept in sync with a remote store
//!
//! The remote holds the last consolidated snapshot plus every patch appended
//! since. Loading decrypts the snapshot and replays the patches locally;
//! consolidating pushes the replayed document back as the new snapshot.

mod codec;
mod engine;
mod error;
mod identity;
mod ops;
mod patch;
mod pointer;

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Map, Value};
use url::Url;

use crate::crypto::Secret;
use crate::remote::{
    Ack, BlobTransport, CreateSubmission, HmacSigner, KeyUpdateSubmission, PatchSubmission,
    RequestSigner, Snapshot, SnapshotSubmission,
};

pub use codec::{
    decrypt_document, decrypt_patch, decrypt_secret, encrypt_document, encrypt_patch,
    encrypt_secret, unwrap_blob_key, wrap_blob_key,
};
pub use engine::apply;
pub use error::BlobError;
pub use identity::{
    AddressField, EntityType, Identity, IdentityField, IdentityRead, NationalIdField,
    NationalIdType, IDENTITY_ROOT,
};
pub use ops::Op;
pub use patch::{compress, normalize, Operation, Subcommand};
pub use pointer::{escape, lookup, unescape, Pointer};

/// Bound on every remote call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobConfig {
    pub timeout: Duration,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobState {
    Uninitialized,
    /// The local document matches the remote snapshot
    Loaded,
    /// The local document is ahead of the remote snapshot
    Dirty,
    Consolidating,
    /// The snapshot could not be decrypted. Terminal.
    Failed,
}

/// A patch that could not be replayed
#[derive(Debug)]
pub struct ReplayFailure {
    /// Position in the remote patch list
    pub index: usize,
    pub error: BlobError,
}

/// What happened to the automatic consolidation after a replay
#[derive(Debug, Default)]
pub enum Consolidation {
    /// There were no patches to fold in
    #[default]
    NotNeeded,
    Consolidated {
        revision: u64,
    },
    /// At least one patch failed, so the snapshot was not replaced
    Skipped,
    Failed(BlobError),
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub applied: usize,
    pub failures: Vec<ReplayFailure>,
    pub consolidation: Consolidation,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parameters for registering a brand new blob
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Account name the remote registers the blob under
    pub account: String,
    /// Recovers the blob key, and is stored encrypted under `unlock_key`
    pub master_secret: Vec<u8>,
    pub unlock_key: Secret,
    pub email: Option<String>,
    pub config: BlobConfig,
}

/// New credentials for an existing blob
#[derive(Debug, Clone)]
pub struct KeyRotation {
    pub id: String,
    pub key: Secret,
    pub unlock_key: Secret,
    pub master_secret: Vec<u8>,
}

pub struct Blob<T: BlobTransport> {
    id: String,
    remote: Url,
    key: Secret,
    /// Revision of the local document
    revision: u64,
    /// Highest revision the remote has acknowledged as a snapshot
    baseline: u64,
    encrypted_secret: Option<String>,
    document: Value,
    state: BlobState,
    /// Patches that failed during the last replay
    replay_failures: usize,
    config: BlobConfig,
    transport: T,
}

impl<T: BlobTransport> std::fmt::Debug for Blob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.id)
            .field("remote", &self.remote.as_str())
            .field("revision", &self.revision)
            .field("baseline", &self.baseline)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: BlobTransport> Blob<T> {
    pub fn new(remote: Url, id: impl Into<String>, key: Secret, transport: T) -> Self {
        Self {
            id: id.into(),
            remote,
            key,
            revision: 0,
            baseline: 0,
            encrypted_secret: None,
            document: Value::Object(Map::new()),
            state: BlobState::Uninitialized,
            replay_failures: 0,
            config: BlobConfig::default(),
            transport,
        }
    }

    pub fn with_config(mut self, config: BlobConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a new blob locally and register it with the remote
    pub async fn create(
        remote: Url,
        id: impl Into<String>,
        key: Secret,
        transport: T,
        options: CreateOptions,
    ) -> Result<Self, BlobError> {
        let mut blob = Self::new(remote, id, key, transport).with_config(options.config);

        let auth_secret = Secret::generate().to_hex();
        let mut document = json!({
            "auth_secret": auth_secret,
            "contacts": [],
            "created": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(email) = &options.email {
            document["email"] = Value::String(email.clone());
        }

        let encrypted_secret = encrypt_secret(&options.unlock_key, &options.master_secret)?;
        let encrypted_blob_key = wrap_blob_key(&options.master_secret, &blob.key)?;
        let sealed = encrypt_document(&blob.key, &document)?;

        blob.document = document;
        let signature = blob.sign(sealed.as_bytes());
        let submission = CreateSubmission {
            blob_id: blob.id.clone(),
            account: options.account,
            document: sealed,
            auth_secret,
            encrypted_secret: encrypted_secret.clone(),
            encrypted_blob_key,
            email: options.email,
            signature,
        };
        bounded(
            blob.config.timeout,
            blob.transport.create_blob(&blob.remote, submission),
        )
        .await?;

        blob.encrypted_secret = Some(encrypted_secret);
        blob.state = BlobState::Loaded;
        tracing::info!(blob_id = %blob.id, "created blob");
        Ok(blob)
    }

    /// Open a blob with only the master secret, given its wrapped key and a
    ///  snapshot obtained out of band
    pub async fn recover(
        remote: Url,
        id: impl Into<String>,
        master_secret: &[u8],
        encrypted_blob_key: &str,
        snapshot: Snapshot,
        transport: T,
    ) -> Result<(Self, ReplayReport), BlobError> {
        let key = unwrap_blob_key(master_secret, encrypted_blob_key)?;
        let mut blob = Self::new(remote, id, key, transport);
        let report = blob.load_snapshot(snapshot).await?;
        Ok((blob, report))
    }

    /// Recover the blob registered for `account`, fetching its wrapped key and
    ///  snapshot from the remote
    pub async fn recover_account(
        remote: Url,
        account: &str,
        master_secret: &[u8],
        transport: T,
        config: BlobConfig,
    ) -> Result<(Self, ReplayReport), BlobError> {
        let bundle = bounded(config.timeout, transport.fetch_recovery(&remote, account)).await?;
        let key = unwrap_blob_key(master_secret, &bundle.encrypted_blob_key)?;
        let mut blob = Self::new(remote, bundle.blob_id, key, transport).with_config(config);
        let report = blob.load_snapshot(bundle.snapshot).await?;
        tracing::info!(blob_id = %blob.id, account, "recovered blob");
        Ok((blob, report))
    }

    /// Re-key the blob under a new id and key. The document is submitted as a
    ///  snapshot at the current revision, with the secret re-encrypted under
    ///  the new unlock key. Local credentials change only once the remote
    ///  accepts.
    pub async fn update_keys(
        &mut self,
        account: &str,
        rotation: KeyRotation,
    ) -> Result<Ack, BlobError> {
        self.ensure_loaded()?;
        if self.replay_failures > 0 {
            return Err(BlobError::ConsolidationSkipped {
                failed: self.replay_failures,
            });
        }

        let revision = self.revision;
        let document = encrypt_document(&rotation.key, &self.document)?;
        let encrypted_secret = encrypt_secret(&rotation.unlock_key, &rotation.master_secret)?;
        let encrypted_blob_key = wrap_blob_key(&rotation.master_secret, &rotation.key)?;
        let signature = self.sign(document.as_bytes());
        let submission = KeyUpdateSubmission {
            previous_id: self.id.clone(),
            blob_id: rotation.id.clone(),
            document,
            revision,
            encrypted_secret: encrypted_secret.clone(),
            encrypted_blob_key,
            signature,
        };

        tracing::debug!(blob_id = %self.id, new_id = %rotation.id, revision, "updating keys");
        let ack = bounded(
            self.config.timeout,
            self.transport.update_keys(&self.remote, account, submission),
        )
        .await?;

        self.id = rotation.id;
        self.key = rotation.key;
        self.encrypted_secret = Some(encrypted_secret);
        self.baseline = self.baseline.max(ack.revision.unwrap_or(revision));
        self.state = if self.revision > self.baseline {
            BlobState::Dirty
        } else {
            BlobState::Loaded
        };
        tracing::info!(blob_id = %self.id, revision = self.baseline, "updated blob keys");
        Ok(ack)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &Secret {
        &self.key
    }

    pub fn remote(&self) -> &Url {
        &self.remote
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    pub fn state(&self) -> BlobState {
        self.state
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn encrypted_secret(&self) -> Option<&str> {
        self.encrypted_secret.as_deref()
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether every patch of the last replay applied
    pub fn is_replay_clean(&self) -> bool {
        self.replay_failures == 0
    }

    /// Read the value at `pointer`; `""` is the whole document
    pub fn get(&self, pointer: &str) -> Result<Option<&Value>, BlobError> {
        let pointer = Pointer::parse_relative(pointer)?;
        lookup(&self.document, &pointer)
    }

    pub fn decrypt_secret(&self, unlock_key: &Secret) -> Result<Vec<u8>, BlobError> {
        let ciphertext = self
            .encrypted_secret
            .as_deref()
            .ok_or_else(|| BlobError::Decryption("blob has no encrypted secret".to_string()))?;
        decrypt_secret(unlock_key, ciphertext)
    }

    pub fn identity(&mut self) -> Identity<'_, T> {
        Identity::new(self)
    }

    /// Fetch the remote snapshot and replay its pending patches
    pub async fn load(&mut self) -> Result<ReplayReport, BlobError> {
        if self.state == BlobState::Failed {
            return Err(BlobError::Failed);
        }
        let snapshot = bounded(
            self.config.timeout,
            self.transport.fetch_snapshot(&self.remote, &self.id),
        )
        .await?;
        self.load_snapshot(snapshot).await
    }

    /// Replace local state with `snapshot` and replay its patches. A replay
    ///  that applies every patch is followed by a consolidation, whose outcome
    ///  is reported rather than raised.
    pub async fn load_snapshot(&mut self, snapshot: Snapshot) -> Result<ReplayReport, BlobError> {
        if self.state == BlobState::Failed {
            return Err(BlobError::Failed);
        }

        let document = match decrypt_document(&self.key, &snapshot.document) {
            Ok(document) => document,
            Err(error) => {
                tracing::warn!(blob_id = %self.id, %error, "failed to decrypt snapshot");
                self.state = BlobState::Failed;
                return Err(error);
            }
        };

        self.document = document;
        self.revision = snapshot.revision;
        self.baseline = snapshot.revision;
        self.encrypted_secret = snapshot.encrypted_secret;

        let mut report = ReplayReport::default();
        for (index, patch) in snapshot.patches.iter().enumerate() {
            let applied = decrypt_patch(&self.key, patch)
                .and_then(|operation| apply(&mut self.document, &operation));
            match applied {
                Ok(()) => {
                    self.revision += 1;
                    report.applied += 1;
                }
                Err(error) => {
                    tracing::warn!(blob_id = %self.id, index, %error, "failed to replay patch");
                    report.failures.push(ReplayFailure { index, error });
                }
            }
        }
        self.replay_failures = report.failures.len();
        self.state = if snapshot.patches.is_empty() {
            BlobState::Loaded
        } else {
            BlobState::Dirty
        };

        tracing::info!(
            blob_id = %self.id,
            revision = self.revision,
            applied = report.applied,
            failed = report.failures.len(),
            "loaded blob"
        );

        report.consolidation = if snapshot.patches.is_empty() {
            Consolidation::NotNeeded
        } else if !report.is_clean() {
            Consolidation::Skipped
        } else {
            match self.consolidate().await {
                Ok(revision) => Consolidation::Consolidated { revision },
                Err(error) => {
                    tracing::warn!(blob_id = %self.id, %error, "automatic consolidation failed");
                    Consolidation::Failed(error)
                }
            }
        };
        Ok(report)
    }

    /// Submit the current document as the new remote snapshot. Returns the
    ///  acknowledged baseline.
    pub async fn consolidate(&mut self) -> Result<u64, BlobError> {
        self.ensure_loaded()?;
        if self.replay_failures > 0 {
            return Err(BlobError::ConsolidationSkipped {
                failed: self.replay_failures,
            });
        }

        let revision = self.revision;
        let document = encrypt_document(&self.key, &self.document)?;
        let signature = self.sign(document.as_bytes());
        let submission = SnapshotSubmission {
            blob_id: self.id.clone(),
            document,
            revision,
            signature,
        };

        tracing::debug!(blob_id = %self.id, revision, "submitting snapshot");
        self.state = BlobState::Consolidating;
        let result = bounded(
            self.config.timeout,
            self.transport.submit_snapshot(&self.remote, submission),
        )
        .await;

        match result {
            Ok(ack) => {
                self.baseline = self.baseline.max(ack.revision.unwrap_or(revision));
                self.state = if self.revision > self.baseline {
                    BlobState::Dirty
                } else {
                    BlobState::Loaded
                };
                tracing::info!(blob_id = %self.id, revision = self.baseline, "consolidated blob");
                Ok(self.baseline)
            }
            Err(error) => {
                self.state = BlobState::Dirty;
                Err(error)
            }
        }
    }

    /// Apply `operation` locally, then append it to the remote log. A remote
    ///  failure is returned but the local mutation stands.
    pub async fn submit_patch(&mut self, operation: Operation) -> Result<Ack, BlobError> {
        self.ensure_loaded()?;
        apply(&mut self.document, &operation)?;
        self.revision += 1;
        self.state = BlobState::Dirty;
        self.send_patch(&operation, self.revision).await
    }

    /// Apply every operation locally, all or nothing, then submit each in
    ///  order. Every submission is attempted; the first failure is returned.
    pub async fn submit_batch(&mut self, operations: Vec<Operation>) -> Result<(), BlobError> {
        self.ensure_loaded()?;
        let mut scratch = self.document.clone();
        for operation in &operations {
            apply(&mut scratch, operation)?;
        }
        if operations.is_empty() {
            return Ok(());
        }

        let first = self.revision + 1;
        self.document = scratch;
        self.revision += operations.len() as u64;
        self.state = BlobState::Dirty;

        let mut unsent = 0usize;
        let mut first_error = None;
        for (operation, revision) in operations.iter().zip(first..) {
            if let Err(error) = self.send_patch(operation, revision).await {
                unsent += 1;
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => {
                tracing::warn!(blob_id = %self.id, unsent, %error, "batch only partly submitted");
                Err(error)
            }
            None => Ok(()),
        }
    }

    pub async fn set(&mut self, pointer: &str, value: Value) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Set { pointer, value }).await
    }

    pub async fn unset(&mut self, pointer: &str) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Unset { pointer }).await
    }

    pub async fn extend(
        &mut self,
        pointer: &str,
        value: Map<String, Value>,
    ) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Extend { pointer, value }).await
    }

    pub async fn unshift(&mut self, pointer: &str, value: Value) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Unshift { pointer, value }).await
    }

    pub async fn push(&mut self, pointer: &str, value: Value) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Push { pointer, value }).await
    }

    pub async fn pop(&mut self, pointer: &str) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Pop { pointer }).await
    }

    pub async fn shift(&mut self, pointer: &str) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Shift { pointer }).await
    }

    pub async fn filter(
        &mut self,
        pointer: &str,
        field: impl Into<String>,
        value: Value,
        subcommands: Vec<Subcommand>,
    ) -> Result<Ack, BlobError> {
        let pointer = Pointer::parse(pointer)?;
        self.submit_patch(Operation::Filter {
            pointer,
            field: field.into(),
            value,
            subcommands,
        })
        .await
    }

    async fn send_patch(&self, operation: &Operation, revision: u64) -> Result<Ack, BlobError> {
        let patch = encrypt_patch(&self.key, operation)?;
        let signature = self.sign(patch.as_bytes());
        let submission = PatchSubmission {
            blob_id: self.id.clone(),
            patch,
            revision,
            signature,
        };
        tracing::debug!(
            blob_id = %self.id,
            revision,
            op = %operation.op(),
            pointer = %operation.pointer(),
            "submitting patch"
        );
        bounded(
            self.config.timeout,
            self.transport.submit_patch(&self.remote, submission),
        )
        .await
    }

    fn ensure_loaded(&self) -> Result<(), BlobError> {
        match self.state {
            BlobState::Uninitialized => Err(BlobError::NotLoaded),
            BlobState::Failed => Err(BlobError::Failed),
            _ => Ok(()),
        }
    }

    /// Signature over `payload`, when the document carries an auth secret
    fn sign(&self, payload: &[u8]) -> Option<String> {
        let auth_secret = self.document.get("auth_secret")?.as_str()?;
        let signer = HmacSigner::from_auth_secret(auth_secret);
        Some(signer.sign(&self.id, payload))
    }
}

/// Run a transport call under `timeout`
async fn bounded<R, E>(
    timeout: Duration,
    call: impl Future<Output = Result<R, E>>,
) -> Result<R, BlobError>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| BlobError::Transport(Box::new(e))),
        Err(_) => Err(BlobError::Timeout(timeout)),
    }
}
