// src/config.rs

//! Packager configuration
//!
//! Loaded from a TOML file, for example:
//!
//! ```toml
//! install_dir = "/srv/packages"
//! host = "https://packages.example.com"
//! host_descriptive_name = "Example packages"
//!
//! [runtime]
//! package = "core"
//! version = "1.0"
//! host = "https://packages.example.com"
//! ```

use crate::error::{Error, Result};
use crate::platform;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory (inside a package) for textures imported by models
pub const DEFAULT_IMPORTED_MAPS_DIR: &str = "imported_maps";

/// Default name of the core runtime package
pub const DEFAULT_CORE_PACKAGE: &str = "core";

/// Default encryption command; `{input}` and `{output}` are substituted and
/// the key is passed through `PACKSMITH_ENCRYPTION_KEY`
pub const DEFAULT_ENCRYPT_COMMAND: &str =
    "openssl enc -aes-256-cbc -pbkdf2 -salt -pass env:PACKSMITH_ENCRYPTION_KEY -in {input} -out {output}";

/// The runtime packages are being built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Name of the core runtime package
    #[serde(default = "default_core_package")]
    pub package: String,
    /// Version of the active runtime
    #[serde(default)]
    pub version: String,
    /// Download host of the active runtime
    #[serde(default)]
    pub host: String,
}

impl Default for RuntimeInfo {
    fn default() -> Self {
        Self {
            package: default_core_package(),
            version: String::new(),
            host: String::new(),
        }
    }
}

/// Extra entries appended to the built-in extension sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub uncompressible: Vec<String>,
    pub unprocessed: Vec<String>,
    pub extract: Vec<String>,
    pub platform_specific: Vec<String>,
}

/// Settings for a packaging run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagerConfig {
    /// Root of the output tree
    pub install_dir: PathBuf,

    /// Scratch space that survives between runs (remote import cache)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_dir: Option<PathBuf>,

    /// Host URL recorded for packages built in this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Human readable host name written into the contents index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_descriptive_name: Option<String>,

    /// Additional directories searched for required packages
    #[serde(default)]
    pub install_search: Vec<PathBuf>,

    /// Platform identifier; defaults to the build host's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeInfo,

    /// Roots searched for module sources
    #[serde(default)]
    pub module_path: Vec<PathBuf>,

    #[serde(default = "default_imported_maps_dir")]
    pub imported_maps_dir: String,

    /// Suffixes appended to schema imports that apply to clients
    #[serde(default = "default_client_suffixes")]
    pub schema_client_suffixes: Vec<String>,

    /// Command run as `<sign_command> -n "<file>"` over config text files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_command: Option<String>,

    /// Key for encrypting config text files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    #[serde(default = "default_encrypt_command")]
    pub encrypt_command: String,

    /// Ask the remote host for packages not found locally
    #[serde(default)]
    pub fetch_remote: bool,

    #[serde(default)]
    pub extensions: ExtensionConfig,
}

fn default_core_package() -> String {
    DEFAULT_CORE_PACKAGE.to_string()
}

fn default_imported_maps_dir() -> String {
    DEFAULT_IMPORTED_MAPS_DIR.to_string()
}

fn default_client_suffixes() -> Vec<String> {
    vec!["OV".to_string()]
}

fn default_encrypt_command() -> String {
    DEFAULT_ENCRYPT_COMMAND.to_string()
}

impl PackagerConfig {
    /// Minimal configuration for an install directory and runtime
    pub fn new(install_dir: impl Into<PathBuf>, runtime_version: &str, runtime_host: &str) -> Self {
        Self {
            install_dir: install_dir.into(),
            persist_dir: None,
            host: None,
            host_descriptive_name: None,
            install_search: Vec::new(),
            platform: None,
            runtime: RuntimeInfo {
                package: default_core_package(),
                version: runtime_version.to_string(),
                host: runtime_host.to_string(),
            },
            module_path: Vec::new(),
            imported_maps_dir: default_imported_maps_dir(),
            schema_client_suffixes: default_client_suffixes(),
            sign_command: None,
            encryption_key: None,
            encrypt_command: default_encrypt_command(),
            fetch_remote: false,
            extensions: ExtensionConfig::default(),
        }
    }

    /// Load configuration from a TOML file. Relative paths are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.install_dir);
        if let Some(persist) = self.persist_dir.as_mut() {
            join(persist);
        }
        self.install_search.iter_mut().for_each(join);
        self.module_path.iter_mut().for_each(join);
    }

    /// Reject configurations that cannot produce distributable packages
    pub fn validate(&self) -> Result<()> {
        if self.install_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("install_dir must be set".to_string()));
        }
        if self.runtime.version.is_empty() || self.runtime.host.is_empty() {
            return Err(Error::ConfigError(
                "packages must be built with a runtime built for distribution \
                 (runtime.version and runtime.host are required)"
                    .to_string(),
            ));
        }
        if self.runtime.package.is_empty() {
            return Err(Error::ConfigError("runtime.package must not be empty".to_string()));
        }
        if self.imported_maps_dir.is_empty() {
            return Err(Error::ConfigError("imported_maps_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Platform identifier in effect for this run
    pub fn effective_platform(&self) -> String {
        self.platform.clone().unwrap_or_else(platform::host_platform)
    }

    /// Host recorded for packages built in this run
    pub fn effective_host(&self) -> String {
        self.host.clone().unwrap_or_else(|| self.runtime.host.clone())
    }

    /// Directory for downloaded import descriptors
    pub fn import_cache_dir(&self) -> PathBuf {
        match &self.persist_dir {
            Some(dir) => dir.join("imports"),
            None => self.install_dir.join(".imports"),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal() {
        let config = PackagerConfig::parse(
            r#"
install_dir = "/srv/packages"

[runtime]
version = "1.0"
host = "https://packages.example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.install_dir, PathBuf::from("/srv/packages"));
        assert_eq!(config.runtime.package, "core");
        assert_eq!(config.imported_maps_dir, "imported_maps");
        assert_eq!(config.schema_client_suffixes, vec!["OV".to_string()]);
        assert_eq!(config.effective_host(), "https://packages.example.com");
        assert!(!config.fetch_remote);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_runtime() {
        let config = PackagerConfig::new("/srv/packages", "", "");
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_from_file_rebases_relative_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packsmith.toml");
        fs::write(
            &path,
            r#"
install_dir = "out"
module_path = ["src"]

[runtime]
version = "2.1"
host = "https://h"

[extensions]
uncompressible = ["flac"]
"#,
        )
        .unwrap();

        let config = PackagerConfig::from_file(&path).unwrap();
        assert_eq!(config.install_dir, temp.path().join("out"));
        assert_eq!(config.module_path, vec![temp.path().join("src")]);
        assert_eq!(config.extensions.uncompressible, vec!["flac".to_string()]);
    }

    #[test]
    fn test_round_trip() {
        let mut config = PackagerConfig::new("/srv/out", "1.0", "https://h");
        config.platform = Some("linux_amd64".to_string());
        let text = config.to_toml().unwrap();
        let parsed = PackagerConfig::parse(&text).unwrap();
        assert_eq!(parsed.effective_platform(), "linux_amd64");
        assert_eq!(parsed.runtime, config.runtime);
    }
}
