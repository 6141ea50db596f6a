// src/contents.rs

//! The contents index
//!
//! `contents.toml` at the root of the install tree lists every package built
//! there, keyed by (name, platform, version). It is loaded once when the
//! packager starts and rewritten on shutdown only if something changed. The
//! last write for a key wins.

use crate::descriptor::FileSpec;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the index inside the install dir
pub const CONTENTS_FILENAME: &str = "contents.toml";

/// (name, platform, version)
pub type EntryKey = (String, Option<String>, Option<String>);

/// One built package as listed in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub solo: bool,
    /// Descriptor (or, for solo packages, the file itself)
    pub file: FileSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_file: Option<FileSpec>,
}

impl PackageEntry {
    pub fn key(&self) -> EntryKey {
        (self.name.clone(), self.platform.clone(), self.version.clone())
    }
}

/// On-disk shape of the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptive_name: Option<String>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
}

impl ContentsDocument {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Entries matching a name and optional version/platform
    pub fn find<'a>(
        &'a self,
        name: &'a str,
        version: Option<&'a str>,
        platform: Option<&'a str>,
    ) -> impl Iterator<Item = &'a PackageEntry> + 'a {
        self.packages.iter().filter(move |p| {
            p.name == name
                && version.is_none_or(|v| p.version.as_deref() == Some(v))
                && (p.platform.is_none() || platform.is_none() || p.platform.as_deref() == platform)
        })
    }
}

/// Registry of packages in one install tree
#[derive(Debug)]
pub struct ContentsIndex {
    path: PathBuf,
    descriptive_name: Option<String>,
    entries: BTreeMap<EntryKey, PackageEntry>,
    changed: bool,
}

impl ContentsIndex {
    /// Empty index that will be written to `install_dir`
    pub fn new(install_dir: &Path) -> Self {
        Self {
            path: install_dir.join(CONTENTS_FILENAME),
            descriptive_name: None,
            entries: BTreeMap::new(),
            changed: false,
        }
    }

    /// Load the index from `install_dir`. A missing index is empty; an
    /// unreadable one is reported and replaced on the next save.
    pub fn load(install_dir: &Path) -> Result<Self> {
        let mut index = Self::new(install_dir);
        if !index.path.exists() {
            return Ok(index);
        }

        let content = fs::read_to_string(&index.path)
            .map_err(|e| Error::IoError(format!("cannot read {}: {}", index.path.display(), e)))?;
        match ContentsDocument::parse(&content) {
            Ok(doc) => {
                index.descriptive_name = doc.descriptive_name;
                for entry in doc.packages {
                    index.entries.insert(entry.key(), entry);
                }
            }
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", index.path.display(), e);
                index.changed = true;
            }
        }
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptive_name(&self) -> Option<&str> {
        self.descriptive_name.as_deref()
    }

    pub fn set_descriptive_name(&mut self, name: Option<String>) {
        if name.is_some() && name != self.descriptive_name {
            self.descriptive_name = name;
            self.changed = true;
        }
    }

    /// Add or replace an entry
    pub fn insert(&mut self, entry: PackageEntry) {
        self.entries.insert(entry.key(), entry);
        self.changed = true;
    }

    pub fn get(&self, name: &str, platform: Option<&str>, version: Option<&str>) -> Option<&PackageEntry> {
        self.entries.get(&(
            name.to_string(),
            platform.map(str::to_string),
            version.map(str::to_string),
        ))
    }

    pub fn entries(&self) -> impl Iterator<Item = &PackageEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn to_document(&self) -> ContentsDocument {
        ContentsDocument {
            descriptive_name: self.descriptive_name.clone(),
            packages: self.entries.values().cloned().collect(),
        }
    }

    /// Write the index if anything changed. Returns whether it was written.
    pub fn save(&mut self) -> Result<bool> {
        if !self.changed {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&self.to_document())?;
        fs::write(&self.path, text)
            .map_err(|e| Error::IoError(format!("cannot write {}: {}", self.path.display(), e)))?;
        info!("Wrote {} ({} packages)", self.path.display(), self.entries.len());
        self.changed = false;
        Ok(true)
    }
}
