use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::state::AppConfig;

/// Initialize logging and the panic handler.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(config: &AppConfig) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    // Stderr layer, so command output on stdout stays parseable
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stderr_writer)
        .with_filter(env_filter(config));

    // File layer (if log_dir is set)
    if let Some(log_dir) = &config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "bvault.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(env_filter(config));

        let _ = tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
    }

    register_panic_logger();
    guards
}

fn env_filter(config: &AppConfig) -> EnvFilter {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    build_filter(rust_log.as_deref(), &config.log_level)
}

/// Directives from `RUST_LOG` when it parses, else the configured `log_level`
fn build_filter(rust_log: Option<&str>, log_level: &str) -> EnvFilter {
    let from_env = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok());
    if let Some(filter) = from_env {
        return filter;
    }
    EnvFilter::try_new(log_level).unwrap_or_else(|e| {
        eprintln!("Warning: invalid log_level {:?}: {}", log_level, e);
        EnvFilter::new("info")
    })
}

/// Registers a panic hook that logs panics using the `tracing` crate
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_accepts_directives() {
        let filter = build_filter(None, "common=debug,warn");
        let rendered = filter.to_string();
        assert!(rendered.contains("common=debug"), "{}", rendered);
        assert!(rendered.contains("warn"), "{}", rendered);
    }

    #[test]
    fn test_rust_log_takes_precedence() {
        let filter = build_filter(Some("blobvault=trace"), "info");
        assert!(filter.to_string().contains("blobvault=trace"));

        let filter = build_filter(Some("  "), "debug");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_log_level_falls_back_to_info() {
        let filter = build_filter(None, "common=loud");
        assert_eq!(filter.to_string(), "info");
    }
}
