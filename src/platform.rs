// src/platform.rs

//! Host platform detection and executable search paths
//!
//! The platform identifier (`linux_amd64`, `osx_arm64`, `win_amd64`, ...) is
//! what a platform-specific package inherits. The host family decides the
//! executable extensions, the dependency tool and whether file matching is
//! case sensitive.

use std::env;
use std::path::{Path, PathBuf};

/// Broad operating system family that drives extension and tool choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFamily {
    Windows,
    MacOs,
    Posix,
}

impl HostFamily {
    /// Family of the machine running the build
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Posix
        }
    }

    /// Family implied by a platform identifier such as `win32` or `osx_i386`
    pub fn from_platform(platform: &str) -> Self {
        if platform.starts_with("win") {
            Self::Windows
        } else if platform.starts_with("osx") {
            Self::MacOs
        } else {
            Self::Posix
        }
    }

    /// Windows and macOS filesystems are case-insensitive by convention
    pub fn is_case_sensitive(&self) -> bool {
        matches!(self, Self::Posix)
    }

    /// Extensions that mark a file as an executable or shared library
    pub fn executable_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["dll", "pyd", "exe"],
            Self::MacOs => &["so", "dylib"],
            Self::Posix => &["so"],
        }
    }

    /// Extension rewrite applied to source names added on this family.
    ///
    /// Manifests are written with Windows names; other families map them to
    /// their native equivalents. `Some("")` means the extension is dropped.
    pub fn remap_extension(&self, ext: &str) -> Option<&'static str> {
        match (self, ext) {
            (Self::Windows, _) => None,
            (Self::MacOs, "dll" | "pyd") => Some("dylib"),
            (Self::Posix, "dll" | "pyd") => Some("so"),
            (_, "exe") => Some(""),
            _ => None,
        }
    }

    fn path_separator(&self) -> char {
        match self {
            Self::Windows => ';',
            _ => ':',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Posix => "posix",
        }
    }
}

impl std::fmt::Display for HostFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Platform identifier of the machine running the build
pub fn host_platform() -> String {
    let arch = match env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        other => other,
    };
    match env::consts::OS {
        "windows" if arch == "i386" => "win32".to_string(),
        "windows" => format!("win_{}", arch),
        "macos" => format!("osx_{}", arch),
        os => format!("{}_{}", os, arch),
    }
}

/// Ordered list of directories used to locate executables and libraries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search path for shared libraries on the given family.
    ///
    /// Windows uses `PATH`; other families use the dynamic loader variables
    /// followed by the standard library directories.
    pub fn for_executables(family: HostFamily) -> Self {
        let mut path = Self::new();
        match family {
            HostFamily::Windows => path.append_env("PATH", family),
            HostFamily::MacOs | HostFamily::Posix => {
                path.append_env("LD_LIBRARY_PATH", family);
                path.append_env("DYLD_LIBRARY_PATH", family);
                path.append_directory("/lib");
                path.append_directory("/usr/lib");
                path.append_directory("/usr/local/lib");
            }
        }
        path
    }

    pub fn append_directory(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() && !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    /// Append each entry of a path-list environment variable
    pub fn append_env(&mut self, var: &str, family: HostFamily) {
        if let Ok(value) = env::var(var) {
            for entry in value.split(family.path_separator()) {
                self.append_directory(entry);
            }
        }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// First existing `dir/name` along the path
    pub fn find_file(&self, name: &Path) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

/// Absolute, canonical form of `path` when it exists; absolute otherwise
pub fn canonical_path(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// Render a path with forward slashes, as used for archive entry names
pub fn slash_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_family_from_platform() {
        assert_eq!(HostFamily::from_platform("win32"), HostFamily::Windows);
        assert_eq!(HostFamily::from_platform("win_amd64"), HostFamily::Windows);
        assert_eq!(HostFamily::from_platform("osx_i386"), HostFamily::MacOs);
        assert_eq!(HostFamily::from_platform("linux_amd64"), HostFamily::Posix);
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(HostFamily::Posix.is_case_sensitive());
        assert!(!HostFamily::Windows.is_case_sensitive());
        assert!(!HostFamily::MacOs.is_case_sensitive());
    }

    #[test]
    fn test_remap_extension() {
        assert_eq!(HostFamily::Posix.remap_extension("dll"), Some("so"));
        assert_eq!(HostFamily::MacOs.remap_extension("pyd"), Some("dylib"));
        assert_eq!(HostFamily::Posix.remap_extension("exe"), Some(""));
        assert_eq!(HostFamily::Windows.remap_extension("dll"), None);
        assert_eq!(HostFamily::Posix.remap_extension("txt"), None);
    }

    #[test]
    fn test_host_platform_has_arch() {
        let platform = host_platform();
        assert!(!platform.is_empty());
        assert!(platform.contains('_') || platform == "win32");
    }

    #[test]
    fn test_search_path_find_file() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join("libz.so"), b"lib").unwrap();

        let mut path = SearchPath::new();
        path.append_directory(first.path());
        path.append_directory(second.path());
        path.append_directory(first.path());

        assert_eq!(path.directories().len(), 2);
        assert_eq!(
            path.find_file(Path::new("libz.so")),
            Some(second.path().join("libz.so"))
        );
        assert_eq!(path.find_file(Path::new("libq.so")), None);
    }
}
