use std::error::Error;
use std::path::PathBuf;

use url::Url;

use blobvault::state::{AppConfig, AppState, DEFAULT_REMOTE};
use blobvault::transport::{HttpTransport, HttpTransportError};

/// Resolve the remote URL for the blob vault.
///
/// Priority: explicit `--remote` flag > config file `remote` > hardcoded default.
pub fn resolve_remote(explicit: Option<Url>, config: Option<&AppConfig>) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    if let Some(config) = config {
        return config.remote.clone();
    }
    Url::parse(DEFAULT_REMOTE).expect("hardcoded URL must parse")
}

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Base URL of the vault server
    pub remote: Url,
    /// Optional custom config path (defaults to ~/.blobvault)
    pub config_path: Option<PathBuf>,
    /// Loaded configuration, or defaults when not initialized
    pub config: AppConfig,
    pub transport: HttpTransport,
}

impl OpContext {
    pub fn new(remote: Option<Url>, config_path: Option<PathBuf>) -> Result<Self, HttpTransportError> {
        let state = AppState::load(config_path.clone()).ok();
        let remote = resolve_remote(remote, state.as_ref().map(|s| &s.config));
        let config = state.map(|s| s.config).unwrap_or_default();
        Ok(Self {
            remote,
            config_path,
            config,
            transport: HttpTransport::new()?,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_remote_explicit_wins() {
        let explicit = Url::parse("http://example.com:9999").unwrap();
        let config = AppConfig::default();
        let result = resolve_remote(Some(explicit.clone()), Some(&config));
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_resolve_remote_uses_config() {
        let config = AppConfig {
            remote: Url::parse("https://vault.example.com").unwrap(),
            ..AppConfig::default()
        };
        let result = resolve_remote(None, Some(&config));
        assert_eq!(result.as_str(), "https://vault.example.com/");
    }

    #[test]
    fn test_resolve_remote_falls_back_to_default() {
        let result = resolve_remote(None, None);
        assert_eq!(result.port().unwrap(), 8080);
    }
}
