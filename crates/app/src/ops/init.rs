use clap::Args;

use blobvault::state::{AppConfig, AppState};

/// Write a config for the remote given by the global `--remote` flag
#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Bound on every remote call, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Default log level
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] blobvault::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            remote: ctx.remote.clone(),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            log_level: self.log_level.clone().unwrap_or(defaults.log_level),
            log_dir: None,
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized blobvault directory at: {}\n\
             - Config: {}\n\
             - Remote: {}\n\
             - Timeout: {}s\n\
             - Log level: {}",
            state.app_dir.display(),
            state.config_path.display(),
            state.config.remote,
            state.config.timeout_secs,
            state.config.log_level,
        );

        Ok(output)
    }
}
