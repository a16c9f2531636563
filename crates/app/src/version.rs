use std::fmt;

/// Build metadata captured by `build.rs`
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub version: &'static str,
    pub rust_version: &'static str,
    pub target: Option<&'static str>,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        version: env!("REPO_VERSION"),
        rust_version: env!("RUST_VERSION"),
        target: option_env!("BUILD_TARGET"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} build, features: {}, built {} with {}",
            env!("CARGO_PKG_NAME"),
            self.version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version,
        )?;
        if let Some(target) = self.target {
            write!(f, ", target {}", target)?;
        }
        write!(f, ")")
    }
}

/// Log the build once at startup
pub fn report_build_info() {
    let build = build_info();

    tracing::debug!(
        build_profile = build.build_profile,
        features = build.build_features,
        version = build.version,
        "bvault starting up"
    );
}
