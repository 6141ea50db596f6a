// src/descriptor/lineage.rs

//! Patch lineage across successive builds of one package
//!
//! Each build reads the descriptor left by the previous build of the same
//! (name, platform, version), carries its patch history forward and records
//! the new archive alongside the preserved `.base` archive that seeds the
//! next patch.

use crate::descriptor::{
    self, FileSpec, ImportDescriptor, PackageDescriptor, PatchRecord, RequirementRecord,
};
use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Patch counter used when no prior descriptor exists
pub const INITIAL_PATCH_VERSION: &str = "1";

/// Patch state recovered from a prior descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLineage {
    pub patch_version: String,
    pub patches: Vec<PatchRecord>,
}

impl Default for PatchLineage {
    fn default() -> Self {
        Self {
            patch_version: INITIAL_PATCH_VERSION.to_string(),
            patches: Vec::new(),
        }
    }
}

/// Only the fields lineage needs; everything else in the document is ignored
#[derive(Debug, Deserialize)]
struct PriorDescriptor {
    #[serde(default)]
    patch_version: Option<String>,
    #[serde(default)]
    last_patch_version: Option<String>,
    #[serde(default)]
    patches: Vec<PatchRecord>,
}

/// Identity and metadata of the package being described
#[derive(Debug, Clone)]
pub struct DescriptorFields<'a> {
    pub name: &'a str,
    pub platform: Option<&'a str>,
    pub version: Option<&'a str>,
    pub host: Option<&'a str>,
    pub config: &'a BTreeMap<String, String>,
    pub requires: Vec<RequirementRecord>,
}

/// Archive files a descriptor records
#[derive(Debug, Clone)]
pub struct ArchiveFiles<'a> {
    pub uncompressed: &'a Path,
    pub compressed: Option<&'a Path>,
    pub base: Option<&'a Path>,
}

/// Reads and writes descriptor documents for one install tree
#[derive(Debug, Clone)]
pub struct PatchLineageTracker {
    install_dir: PathBuf,
}

fn basename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PatchLineageTracker {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Best-effort read of the previous build's patch state
    pub fn read_prior_descriptor(&self, path: &Path) -> PatchLineage {
        if !path.exists() {
            return PatchLineage::default();
        }
        match descriptor::read_document::<PriorDescriptor>(path) {
            Ok(prior) => PatchLineage {
                patch_version: prior
                    .patch_version
                    .or(prior.last_patch_version)
                    .unwrap_or_else(|| INITIAL_PATCH_VERSION.to_string()),
                patches: prior.patches,
            },
            Err(e) => {
                debug!("Ignoring unreadable prior descriptor: {}", e);
                PatchLineage::default()
            }
        }
    }

    /// Write the full descriptor. Archive records are named by basename,
    /// since the descriptor sits next to the archive.
    pub fn write_descriptor(
        &self,
        path: &Path,
        fields: &DescriptorFields<'_>,
        lineage: &PatchLineage,
        archives: &ArchiveFiles<'_>,
        mut extracts: Vec<FileSpec>,
    ) -> Result<PackageDescriptor> {
        extracts.sort_by(|a, b| a.filename.cmp(&b.filename));

        let spec = |p: &Path| FileSpec::from_file(p, basename_of(p));
        let compressed_archive = archives.compressed.map(spec).transpose()?;
        let base_version = archives
            .base
            .filter(|p| p.exists())
            .map(spec)
            .transpose()?;

        let document = PackageDescriptor {
            name: fields.name.to_string(),
            platform: fields.platform.map(str::to_string),
            version: fields.version.map(str::to_string),
            host: fields.host.map(str::to_string),
            last_patch_version: lineage.patch_version.clone(),
            config: fields.config.clone(),
            requires: fields.requires.clone(),
            uncompressed_archive: spec(archives.uncompressed)?,
            compressed_archive,
            base_version,
            patches: lineage.patches.clone(),
            extracts,
        };
        descriptor::write_document(path, &document)?;
        Ok(document)
    }

    /// Write the public import descriptor dependents resolve against
    pub fn write_import_descriptor(
        &self,
        path: &Path,
        mut document: ImportDescriptor,
    ) -> Result<ImportDescriptor> {
        document.sort_tables();
        descriptor::write_document(path, &document)?;
        Ok(document)
    }

    /// Path relative to the install dir, with forward slashes
    pub fn relative_name(&self, path: &Path) -> String {
        match path.strip_prefix(&self.install_dir) {
            Ok(rel) => crate::platform::slash_path(rel),
            Err(_) => basename_of(path),
        }
    }
}
