use clap::{Args, Subcommand};
use common::blob::{BlobError, IdentityRead};
use common::crypto::Secret;
use serde_json::Value;

use super::{parse_value, BlobArgs};
use crate::op::Op;

crate::command_enum! {
    (Get, IdentityGet),
    (Set, IdentitySet),
    (List, IdentityList),
}

pub type IdentityCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Identity {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[async_trait::async_trait]
impl Op for Identity {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity error: {0}")]
    Blob(#[from] BlobError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn field_key(hex: Option<&str>) -> Result<Option<Secret>, BlobError> {
    hex.map(Secret::from_hex)
        .transpose()
        .map_err(BlobError::from)
}

fn render(read: &IdentityRead) -> Result<String, serde_json::Error> {
    let value = serde_json::to_string(read.value())?;
    Ok(match read {
        IdentityRead::Plain(_) => value,
        IdentityRead::Decrypted(_) => format!("{} (encrypted)", value),
        IdentityRead::Sealed { error, .. } => format!("<sealed: {}>", error),
    })
}

#[derive(Args, Debug, Clone)]
pub struct IdentityGet {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Hex key that sealed the field, if it was stored encrypted
    #[arg(long)]
    pub field_key: Option<String>,

    /// Vault field, e.g. name or address
    pub field: String,
}

#[async_trait::async_trait]
impl Op for IdentityGet {
    type Error = IdentityError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = field_key(self.field_key.as_deref())?;
        let mut blob = self.blob.open(ctx).await?;
        let identity = blob.identity();
        match identity.get(&self.field, key.as_ref()) {
            Some(read) => Ok(render(&read)?),
            None => Ok(Value::Null.to_string()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IdentitySet {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Seal the field under this hex key
    #[arg(long)]
    pub field_key: Option<String>,

    pub field: String,

    /// JSON value (bare text is taken as a string)
    pub value: String,
}

#[async_trait::async_trait]
impl Op for IdentitySet {
    type Error = IdentityError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = field_key(self.field_key.as_deref())?;
        let mut blob = self.blob.open(ctx).await?;
        blob.identity()
            .set(&self.field, key.as_ref(), parse_value(&self.value))
            .await?;
        Ok(format!(
            "stored {} at revision {}",
            self.field,
            blob.revision()
        ))
    }
}

#[derive(Args, Debug, Clone)]
pub struct IdentityList {
    #[command(flatten)]
    pub blob: BlobArgs,

    #[arg(long)]
    pub field_key: Option<String>,
}

#[async_trait::async_trait]
impl Op for IdentityList {
    type Error = IdentityError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let key = field_key(self.field_key.as_deref())?;
        let mut blob = self.blob.open(ctx).await?;
        let identity = blob.identity();
        let lines = identity
            .get_all(key.as_ref())
            .iter()
            .map(|(field, read)| Ok(format!("{}: {}", field, render(read)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        Ok(lines.join("\n"))
    }
}
