pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "bvault")]
#[command(about = "Read and patch encrypted JSON blobs")]
pub struct Args {
    /// Vault server URL (defaults to the configured remote)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the blobvault config directory (defaults to ~/.blobvault)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
