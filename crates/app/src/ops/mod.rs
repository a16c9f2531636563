pub mod account;
pub mod consolidate;
pub mod document;
pub mod identity;
pub mod init;
pub mod version;

pub use account::{Create, Recover, Rotate};
pub use consolidate::Consolidate;
pub use document::{Extend, Filter, Get, Pop, Push, Set, Shift, Unset, Unshift};
pub use identity::Identity;
pub use init::Init;
pub use version::Version;

use clap::Args;
use common::blob::{Blob, BlobError, Consolidation};
use common::crypto::Secret;

use blobvault::HttpTransport;

use crate::op::OpContext;

/// Which blob to open, and the key that decrypts it
#[derive(Args, Debug, Clone)]
pub struct BlobArgs {
    /// Blob identifier
    #[arg(long)]
    pub id: String,

    /// Hex-encoded blob key
    #[arg(long)]
    pub key: String,
}

impl BlobArgs {
    /// Fetch the blob and replay its pending patches
    pub async fn open(&self, ctx: &OpContext) -> Result<Blob<HttpTransport>, BlobError> {
        let key = Secret::from_hex(&self.key)?;
        let mut blob = Blob::new(
            ctx.remote.clone(),
            self.id.clone(),
            key,
            ctx.transport.clone(),
        )
        .with_config(ctx.config.blob_config());

        let report = blob.load().await?;
        for failure in &report.failures {
            eprintln!(
                "Warning: skipped patch {}: {}",
                failure.index, failure.error
            );
        }
        if let Consolidation::Failed(error) = &report.consolidation {
            eprintln!("Warning: consolidation failed: {}", error);
        }
        Ok(blob)
    }
}

/// Parse a JSON argument, falling back to a bare string
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("5"), json!(5));
        assert_eq!(parse_value(r#"{"a":[1]}"#), json!({"a": [1]}));
        assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
        assert_eq!(parse_value("bare words"), json!("bare words"));
    }
}
