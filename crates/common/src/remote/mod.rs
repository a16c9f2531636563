//! Seams to the remote blob store
//!
//! - [`BlobTransport`]: async request/response access to snapshots and the patch log
//! - [`RequestSigner`]: opaque signatures the remote uses to authenticate writes
//! - [`MemoryTransport`]: an in-process store implementing the same contract

mod memory;
mod provider;
mod signing;

pub use memory::{MemoryTransport, MemoryTransportError};
pub use provider::{
    Ack, BlobTransport, CreateSubmission, KeyUpdateSubmission, PatchSubmission, RecoveryBundle,
    Snapshot, SnapshotSubmission,
};
pub use signing::{HmacSigner, RequestSigner};
