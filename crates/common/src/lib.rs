/**
 * Versioned, encrypted JSON documents.
 *  - Pointer addressing and the patch engine
 *  - Replay of the remote patch log and consolidation
 *  - The identity vault stored inside a blob
 */
pub mod blob;
/**
 * Symmetric key derivation and authenticated
 *  encryption, shared by every sealed payload.
 */
pub mod crypto;
/**
 * Access to the remote blob store.
 * Transports are swappable; an in-memory one
 *  backs tests and offline use.
 */
pub mod remote;

pub mod prelude {
    pub use crate::blob::{
        Blob, BlobConfig, BlobError, BlobState, Consolidation, CreateOptions, KeyRotation,
        Operation, Pointer, ReplayReport, Subcommand,
    };
    pub use crate::crypto::{KeyPurpose, Secret};
    pub use crate::remote::{BlobTransport, MemoryTransport, Snapshot};
}
