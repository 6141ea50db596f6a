// src/descriptor/mod.rs

//! Package metadata documents
//!
//! Three TOML documents describe a built package:
//!
//! - the **descriptor** (`<basename>.toml`): archive size/timestamp/hash for the
//!   raw and compressed forms, the preserved base archive, the patch history
//!   and the extract table;
//! - the **import descriptor** (`<basename>.import.toml`): what dependents
//!   read to learn the package's requirements, files and modules;
//! - the **application manifest** (`app_info.toml`), embedded uncompressed
//!   inside application archives.

pub mod lineage;

pub use lineage::{PatchLineage, PatchLineageTracker};

use crate::error::{Error, Result};
use crate::files::pack_file::file_timestamp;
use crate::hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Archive entry name of the embedded application manifest
pub const APP_MANIFEST_ENTRY: &str = "app_info.toml";

/// Size, modification time and SHA-256 of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path relative to the install dir (or archive entry name)
    pub filename: String,
    pub size: u64,
    pub timestamp: u64,
    pub hash: String,
}

impl FileSpec {
    /// Describe a file on disk under the given recorded name
    pub fn from_file(path: &Path, filename: impl Into<String>) -> Result<Self> {
        let metadata = fs::metadata(path)
            .map_err(|e| Error::IoError(format!("cannot stat {}: {}", path.display(), e)))?;
        Ok(Self {
            filename: filename.into(),
            size: metadata.len(),
            timestamp: file_timestamp(path),
            hash: hash::sha256_file(path)?,
        })
    }

    /// Describe in-memory content
    pub fn from_bytes(filename: impl Into<String>, data: &[u8], timestamp: u64) -> Self {
        Self {
            filename: filename.into(),
            size: data.len() as u64,
            timestamp,
            hash: hash::sha256(data),
        }
    }

    /// True if `path` still has the recorded size and hash
    pub fn matches_file(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(m) if m.len() == self.size => hash::file_matches(path, &self.hash),
            _ => false,
        }
    }
}

/// One entry of a requirement list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// A module a package exposes to its dependents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub forbid: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_children: bool,
}

impl ModuleRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclude: false,
            forbid: false,
            allow_children: false,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A file stored in a package archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub filename: String,
}

/// A historical patch carried forward between builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub filename: String,
    pub size: u64,
    pub timestamp: u64,
    pub hash: String,
    /// Hash of the archive the patch applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// Hash of the archive the patch produces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hash: Option<String>,
}

/// The full descriptor written next to each archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(alias = "patch_version")]
    pub last_patch_version: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub requires: Vec<RequirementRecord>,
    pub uncompressed_archive: FileSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_archive: Option<FileSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<FileSpec>,
    #[serde(default)]
    pub patches: Vec<PatchRecord>,
    #[serde(default)]
    pub extracts: Vec<FileSpec>,
}

/// What dependents read to resolve a requirement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub requires: Vec<RequirementRecord>,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

/// Manifest embedded in application archives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub main_module: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub requires: Vec<RequirementRecord>,
}

/// Serialize a document to pretty TOML
pub fn to_toml<T: Serialize>(document: &T) -> Result<String> {
    Ok(toml::to_string_pretty(document)?)
}

/// Write a document to disk
pub fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_toml(document)?)
        .map_err(|e| Error::IoError(format!("cannot write {}: {}", path.display(), e)))
}

/// Read a document from disk
pub fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
}

impl ImportDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        read_document(path)
    }

    /// Sort components and modules by case-folded name
    pub fn sort_tables(&mut self) {
        self.components
            .sort_by(|a, b| a.filename.to_lowercase().cmp(&b.filename.to_lowercase()));
        self.modules
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }
}

impl PackageDescriptor {
    pub fn from_file(path: &Path) -> Result<Self> {
        read_document(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_spec_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.mf");
        fs::write(&path, b"hello world").unwrap();

        let spec = FileSpec::from_file(&path, "a/1.0/a.1.0.mf").unwrap();
        assert_eq!(spec.size, 11);
        assert_eq!(spec.hash, hash::sha256(b"hello world"));
        assert!(spec.timestamp > 0);
        assert!(spec.matches_file(&path));

        fs::write(&path, b"hello there").unwrap();
        assert!(!spec.matches_file(&path));
    }

    #[test]
    fn test_import_descriptor_sorting_and_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut desc = ImportDescriptor {
            name: "toolkit".to_string(),
            platform: None,
            version: Some("1.0".to_string()),
            host: Some("https://h".to_string()),
            requires: vec![RequirementRecord {
                name: "core".to_string(),
                platform: None,
                version: Some("1.0".to_string()),
                host: Some("https://h".to_string()),
            }],
            components: vec![
                ComponentRecord { filename: "b.txt".to_string() },
                ComponentRecord { filename: "A.txt".to_string() },
            ],
            modules: vec![ModuleRecord::new("zeta"), ModuleRecord::new("Alpha")],
        };
        desc.sort_tables();
        assert_eq!(desc.components[0].filename, "A.txt");
        assert_eq!(desc.modules[0].name, "Alpha");

        let path = temp.path().join("toolkit.1.0.import.toml");
        write_document(&path, &desc).unwrap();
        assert_eq!(ImportDescriptor::from_file(&path).unwrap(), desc);
    }

    #[test]
    fn test_descriptor_accepts_patch_version_alias() {
        let text = r#"
name = "toolkit"
patch_version = "4"

[uncompressed_archive]
filename = "toolkit.mf"
size = 10
timestamp = 1
hash = "00"
"#;
        let desc: PackageDescriptor = toml::from_str(text).unwrap();
        assert_eq!(desc.last_patch_version, "4");
        assert!(desc.patches.is_empty());
        assert!(desc.compressed_archive.is_none());
    }
}
