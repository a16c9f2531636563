use clap::Args;
use common::blob::BlobError;

use super::BlobArgs;

#[derive(Args, Debug, Clone)]
pub struct Consolidate {
    #[command(flatten)]
    pub blob: BlobArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    #[error("consolidate failed: {0}")]
    Blob(#[from] BlobError),
}

#[async_trait::async_trait]
impl crate::op::Op for Consolidate {
    type Error = ConsolidateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut blob = self.blob.open(ctx).await?;
        let revision = blob.consolidate().await?;
        Ok(format!("{} consolidated at revision {}", blob.id(), revision))
    }
}
