use std::fmt;

use serde::Serialize;

/// Compile-time build metadata of the calling binary
///
/// Filled in by [`build_info!`](crate::build_info), which reads the variables a
/// crate's `build.rs` exports (`BUILD_PROFILE`, `BUILD_FEATURES`,
/// `REPO_VERSION`, `BUILD_TIMESTAMP`, `RUST_VERSION`, `BUILD_TARGET`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub repo_version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub build_target: Option<&'static str>,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({})", self.name, self.version, self.repo_version)?;
        writeln!(f, "profile:   {}", self.build_profile)?;
        writeln!(f, "features:  {}", self.build_features)?;
        writeln!(f, "built:     {}", self.build_timestamp)?;
        write!(f, "rustc:     {}", self.rust_version)?;
        if let Some(target) = self.build_target {
            write!(f, "\ntarget:    {}", target)?;
        }
        Ok(())
    }
}

/// Build a [`BuildInfo`] from the invoking crate's environment
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            repo_version: env!("REPO_VERSION"),
            build_profile: env!("BUILD_PROFILE"),
            build_features: env!("BUILD_FEATURES"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rust_version: env!("RUST_VERSION"),
            build_target: option_env!("BUILD_TARGET"),
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        let info = BuildInfo {
            name: "qdv",
            version: "0.1.0",
            repo_version: "abc1234",
            build_profile: "debug",
            build_features: "none",
            build_timestamp: "2026-01-01T00:00:00Z",
            rust_version: "rustc 1.80.0",
            build_target: None,
        };
        let rendered = info.to_string();
        assert!(rendered.starts_with("qdv 0.1.0 (abc1234)"));
        assert!(!rendered.contains("target"));
    }
}
