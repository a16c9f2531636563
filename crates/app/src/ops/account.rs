use clap::Args;
use common::blob::{Blob, BlobError, CreateOptions, KeyRotation};
use common::crypto::Secret;

use super::BlobArgs;
use crate::op::{Op, OpContext};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account error: {0}")]
    Blob(#[from] BlobError),
    #[error("invalid master secret: {0}")]
    MasterSecret(#[from] hex::FromHexError),
}

fn credentials<T: common::remote::BlobTransport>(blob: &Blob<T>) -> String {
    format!(
        "id: {}\nkey: {}\nrevision: {}",
        blob.id(),
        blob.key().to_hex(),
        blob.revision()
    )
}

/// Register a new blob for an account
#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Account name on the remote
    #[arg(long)]
    pub account: String,

    /// Hex-encoded master secret
    #[arg(long)]
    pub master_secret: String,

    /// Hex key the master secret is stored under
    #[arg(long)]
    pub unlock_key: String,

    /// Blob identifier; random when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Hex-encoded blob key; random when omitted
    #[arg(long)]
    pub key: Option<String>,

    #[arg(long)]
    pub email: Option<String>,
}

#[async_trait::async_trait]
impl Op for Create {
    type Error = AccountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let key = match &self.key {
            Some(hex) => Secret::from_hex(hex).map_err(BlobError::from)?,
            None => Secret::generate(),
        };
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| Secret::generate().to_hex());
        let options = CreateOptions {
            account: self.account.clone(),
            master_secret: hex::decode(&self.master_secret)?,
            unlock_key: Secret::from_hex(&self.unlock_key).map_err(BlobError::from)?,
            email: self.email.clone(),
            config: ctx.config.blob_config(),
        };
        let blob = Blob::create(
            ctx.remote.clone(),
            id,
            key,
            ctx.transport.clone(),
            options,
        )
        .await?;
        Ok(credentials(&blob))
    }
}

/// Recover an account's blob with only its master secret
#[derive(Args, Debug, Clone)]
pub struct Recover {
    #[arg(long)]
    pub account: String,

    /// Hex-encoded master secret
    #[arg(long)]
    pub master_secret: String,
}

#[async_trait::async_trait]
impl Op for Recover {
    type Error = AccountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let master_secret = hex::decode(&self.master_secret)?;
        let (blob, report) = Blob::recover_account(
            ctx.remote.clone(),
            &self.account,
            &master_secret,
            ctx.transport.clone(),
            ctx.config.blob_config(),
        )
        .await?;
        for failure in &report.failures {
            eprintln!(
                "Warning: skipped patch {}: {}",
                failure.index, failure.error
            );
        }
        Ok(credentials(&blob))
    }
}

/// Move a blob to a new id and key, re-encrypting its secret
#[derive(Args, Debug, Clone)]
pub struct Rotate {
    #[command(flatten)]
    pub blob: BlobArgs,

    #[arg(long)]
    pub account: String,

    /// Hex-encoded master secret
    #[arg(long)]
    pub master_secret: String,

    /// Hex key the master secret is re-encrypted under
    #[arg(long)]
    pub unlock_key: String,

    /// New blob identifier; random when omitted
    #[arg(long)]
    pub new_id: Option<String>,

    /// New hex-encoded blob key; random when omitted
    #[arg(long)]
    pub new_key: Option<String>,
}

#[async_trait::async_trait]
impl Op for Rotate {
    type Error = AccountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let rotation = KeyRotation {
            id: self
                .new_id
                .clone()
                .unwrap_or_else(|| Secret::generate().to_hex()),
            key: match &self.new_key {
                Some(hex) => Secret::from_hex(hex).map_err(BlobError::from)?,
                None => Secret::generate(),
            },
            unlock_key: Secret::from_hex(&self.unlock_key).map_err(BlobError::from)?,
            master_secret: hex::decode(&self.master_secret)?,
        };
        let mut blob = self.blob.open(ctx).await?;
        blob.update_keys(&self.account, rotation).await?;
        Ok(credentials(&blob))
    }
}
