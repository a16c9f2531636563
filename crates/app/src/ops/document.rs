use async_trait::async_trait;
use clap::Args;
use common::blob::{normalize, Blob, BlobError};
use serde_json::Value;

use blobvault::HttpTransport;

use super::{parse_value, BlobArgs};
use crate::op::{Op, OpContext};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidArgument(String),
}

fn committed(blob: &Blob<HttpTransport>) -> String {
    format!("{} now at revision {}", blob.id(), blob.revision())
}

#[derive(Args, Debug, Clone)]
pub struct Get {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Pointer to read; the whole document when omitted
    #[arg(default_value = "")]
    pub pointer: String,
}

#[async_trait]
impl Op for Get {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let blob = self.blob.open(ctx).await?;
        let value = blob.get(&self.pointer)?.cloned().unwrap_or(Value::Null);
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[derive(Args, Debug, Clone)]
pub struct Set {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Pointer to write, e.g. /contacts/0/name
    pub pointer: String,

    /// JSON value (bare text is taken as a string)
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[async_trait]
impl Op for Set {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.set(&self.pointer, parse_value(&self.value)).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Unset {
    #[command(flatten)]
    pub blob: BlobArgs,

    pub pointer: String,
}

#[async_trait]
impl Op for Unset {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.unset(&self.pointer).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Extend {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Pointer to an existing mapping
    pub pointer: String,

    /// JSON mapping merged into the target
    pub value: String,
}

#[async_trait]
impl Op for Extend {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let Value::Object(value) = serde_json::from_str(&self.value)? else {
            return Err(DocumentError::InvalidArgument(
                "extend expects a JSON object".to_string(),
            ));
        };
        let mut blob = self.blob.open(ctx).await?;
        blob.extend(&self.pointer, value).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Unshift {
    #[command(flatten)]
    pub blob: BlobArgs,

    pub pointer: String,

    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[async_trait]
impl Op for Unshift {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.unshift(&self.pointer, parse_value(&self.value)).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Push {
    #[command(flatten)]
    pub blob: BlobArgs,

    pub pointer: String,

    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[async_trait]
impl Op for Push {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.push(&self.pointer, parse_value(&self.value)).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Pop {
    #[command(flatten)]
    pub blob: BlobArgs,

    pub pointer: String,
}

#[async_trait]
impl Op for Pop {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.pop(&self.pointer).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Shift {
    #[command(flatten)]
    pub blob: BlobArgs,

    pub pointer: String,
}

#[async_trait]
impl Op for Shift {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        blob.shift(&self.pointer).await?;
        Ok(committed(&blob))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Filter {
    #[command(flatten)]
    pub blob: BlobArgs,

    /// Pointer to a sequence of mappings
    pub pointer: String,

    /// Key compared on each element
    pub field: String,

    /// JSON value the key must equal
    #[arg(allow_hyphen_values = true)]
    pub value: String,

    /// Subcommands as JSON, e.g. '[["set", "/seen", true]]'
    pub subcommands: String,
}

#[async_trait]
impl Op for Filter {
    type Error = DocumentError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let tail: Value = serde_json::from_str(&self.subcommands)?;
        let subcommands = normalize(std::slice::from_ref(&tail))?;
        let mut blob = self.blob.open(ctx).await?;
        blob.filter(
            &self.pointer,
            self.field.clone(),
            parse_value(&self.value),
            subcommands,
        )
        .await?;
        Ok(committed(&blob))
    }
}
