// src/env.rs

//! The immutable environment shared by every package built in one run

use crate::config::PackagerConfig;
use crate::error::Result;
use crate::files::{ExclusionMatcher, ExtensionTable, FileClassifier};
use crate::platform::{HostFamily, SearchPath};

/// Derived settings for a packaging run
#[derive(Debug, Clone)]
pub struct BuildEnv {
    pub config: PackagerConfig,
    /// Platform identifier that platform-specific packages inherit
    pub platform: String,
    pub family: HostFamily,
    /// Host recorded on packages built in this run
    pub host: String,
    pub classifier: FileClassifier,
    pub matcher: ExclusionMatcher,
    /// Where executables and their shared libraries are looked up
    pub executable_path: SearchPath,
}

impl BuildEnv {
    /// Validate the configuration and derive the run environment
    pub fn new(config: PackagerConfig) -> Result<Self> {
        config.validate()?;
        let platform = config.effective_platform();
        let family = HostFamily::from_platform(&platform);
        let table = ExtensionTable::for_family(family).with_config(&config.extensions);

        Ok(Self {
            host: config.effective_host(),
            classifier: FileClassifier::new(table),
            matcher: ExclusionMatcher::new(family.is_case_sensitive()),
            executable_path: SearchPath::for_executables(family),
            platform,
            family,
            config,
        })
    }

    /// Name of the core runtime package
    pub fn core_package(&self) -> &str {
        &self.config.runtime.package
    }

    pub fn runtime_version(&self) -> &str {
        &self.config.runtime.version
    }

    pub fn runtime_host(&self) -> &str {
        &self.config.runtime.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_follows_configured_platform() {
        let mut config = PackagerConfig::new("/tmp/out", "1.0", "https://h");
        config.platform = Some("win_amd64".to_string());
        let env = BuildEnv::new(config).unwrap();
        assert_eq!(env.family, HostFamily::Windows);
        assert!(!env.matcher.is_case_sensitive());
        assert_eq!(env.core_package(), "core");
        assert_eq!(env.host, "https://h");
    }

    #[test]
    fn test_rejects_undistributable_runtime() {
        let config = PackagerConfig::new("/tmp/out", "", "");
        assert!(BuildEnv::new(config).is_err());
    }
}
