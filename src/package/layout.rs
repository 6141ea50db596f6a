// src/package/layout.rs

//! Where a built package lands in the install tree

use crate::resolver::IMPORT_DESCRIPTOR_SUFFIX;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Archive extension for library packages
pub const MULTIFILE_EXTENSION: &str = "mf";

/// Archive extension for applications
pub const APPLICATION_EXTENSION: &str = "p3d";

/// Descriptor extension
pub const DESCRIPTOR_EXTENSION: &str = "toml";

/// `path` with `suffix` appended to its final component
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// `name[.version][.platform]`
pub fn package_basename(name: &str, version: Option<&str>, platform: Option<&str>) -> String {
    let mut base = name.to_string();
    for part in [version, platform].into_iter().flatten() {
        base.push('.');
        base.push_str(part);
    }
    base
}

/// Output paths of a multifile package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub basename: String,
    /// Directory holding the descriptors
    pub dir: PathBuf,
    pub archive: PathBuf,
    pub descriptor: PathBuf,
    pub import_descriptor: PathBuf,
}

impl PackageLayout {
    /// Libraries go to `name[/version][/platform]/`; applications sit at the
    /// install root.
    pub fn multifile(
        install_dir: &Path,
        name: &str,
        version: Option<&str>,
        platform: Option<&str>,
        application: bool,
    ) -> Self {
        let basename = package_basename(name, version, platform);
        let dir = if application {
            install_dir.to_path_buf()
        } else {
            let mut dir = install_dir.join(name);
            for part in [version, platform].into_iter().flatten() {
                dir.push(part);
            }
            dir
        };
        let extension = if application {
            APPLICATION_EXTENSION
        } else {
            MULTIFILE_EXTENSION
        };

        Self {
            archive: dir.join(format!("{}.{}", basename, extension)),
            descriptor: dir.join(format!("{}.{}", basename, DESCRIPTOR_EXTENSION)),
            import_descriptor: dir.join(format!("{}{}", basename, IMPORT_DESCRIPTOR_SUFFIX)),
            basename,
            dir,
        }
    }

    /// Gzip sibling shipped for download
    pub fn compressed_archive(&self) -> PathBuf {
        with_suffix(&self.archive, crate::files::classifier::PZ_SUFFIX)
    }

    /// Previous archive kept as the bottom of the patch chain
    pub fn base_archive(&self) -> PathBuf {
        with_suffix(&self.archive, ".base")
    }
}

/// Install directory of a solo package: `name[/platform][/version]`
pub fn solo_dir(install_dir: &Path, name: &str, platform: Option<&str>, version: Option<&str>) -> PathBuf {
    let mut dir = install_dir.join(name);
    for part in [platform, version].into_iter().flatten() {
        dir.push(part);
    }
    dir
}
