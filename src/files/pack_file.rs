// src/files/pack_file.rs

//! One input file slated for inclusion in a package

use crate::error::Result;
use crate::files::classifier::{self, FileClassifier, FileFlags, FileOverrides};
use crate::platform::{self, SearchPath};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Everything a directive knows about a file before classification
#[derive(Debug, Clone, Default)]
pub struct PackFileSpec {
    pub source: PathBuf,
    /// Name inside the archive; defaults to the source path
    pub target: Option<String>,
    pub explicit: bool,
    pub overrides: FileOverrides,
    /// Inline content used instead of reading `source`
    pub text: Option<String>,
    /// Remove `source` once the package is written
    pub delete_temp: bool,
}

impl PackFileSpec {
    /// An explicitly added file
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            explicit: true,
            ..Self::default()
        }
    }

    /// A file discovered implicitly (dependency scan, directory walk, ...)
    pub fn implicit(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            explicit: false,
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn with_overrides(mut self, overrides: FileOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_text(mut self, text: Option<String>) -> Self {
        self.text = text;
        self
    }

    pub fn with_delete_temp(mut self, delete_temp: bool) -> Self {
        self.delete_temp = delete_temp;
        self
    }
}

/// A classified input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    pub source: PathBuf,
    pub target: String,
    pub explicit: bool,
    pub flags: FileFlags,
    pub text: Option<String>,
    pub delete_temp: bool,
}

impl PackFile {
    /// Classify a file and resolve its source path.
    ///
    /// A `.pz` target is stored without the suffix and always compressed.
    /// Executables are looked up along `executable_path` when the given
    /// source does not exist.
    pub fn new(spec: PackFileSpec, classifier: &FileClassifier, executable_path: &SearchPath) -> Self {
        let raw_target = spec
            .target
            .clone()
            .unwrap_or_else(|| platform::slash_path(&spec.source));
        let (target, pz) = classifier::strip_pz(&raw_target);

        let mut overrides = spec.overrides;
        if pz && overrides.compress.is_none() {
            overrides.compress = Some(true);
        }
        let flags = classifier.classify(&target, &overrides);

        let mut source = spec.source;
        if flags.executable && spec.text.is_none() && !source.exists() && source.is_relative() {
            if let Some(found) = executable_path.find_file(&source) {
                source = found;
            }
        }
        if source.exists() || source.is_absolute() {
            source = platform::canonical_path(&source);
        }

        Self {
            source,
            target,
            explicit: spec.explicit,
            flags,
            text: spec.text,
            delete_temp: spec.delete_temp,
        }
    }

    /// Lowercase extension of the target name
    pub fn extension(&self) -> String {
        classifier::extension_of(&self.target)
    }

    /// Basename of the target name
    pub fn basename(&self) -> &str {
        classifier::basename(&self.target)
    }

    /// True if the content is available (inline text or an existing source)
    pub fn is_available(&self) -> bool {
        self.text.is_some() || self.source.exists()
    }

    /// Raw bytes to store
    pub fn read_contents(&self) -> Result<Vec<u8>> {
        match &self.text {
            Some(text) => Ok(text.as_bytes().to_vec()),
            None => Ok(fs::read(&self.source)?),
        }
    }

    /// Modification time of the source in seconds, 0 for inline text
    pub fn timestamp(&self) -> u64 {
        if self.text.is_some() {
            return 0;
        }
        file_timestamp(&self.source)
    }

    /// Remove the source if it was a temporary
    pub fn cleanup(&self) {
        if self.delete_temp && self.source.exists() {
            if let Err(e) = fs::remove_file(&self.source) {
                tracing::warn!("Could not remove temporary {}: {}", self.source.display(), e);
            }
        }
    }
}

/// Modification time of a file in seconds since the epoch, 0 if unknown
pub fn file_timestamp(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HostFamily;
    use tempfile::TempDir;

    fn classifier() -> FileClassifier {
        FileClassifier::for_family(HostFamily::Posix)
    }

    #[test]
    fn test_pz_target_forces_compression() {
        let file = PackFile::new(
            PackFileSpec::new("maps/wood.png.pz"),
            &classifier(),
            &SearchPath::new(),
        );
        assert_eq!(file.target, "maps/wood.png");
        assert!(file.flags.compress);
        assert_eq!(file.extension(), "png");
    }

    #[test]
    fn test_explicit_override_beats_pz() {
        let spec = PackFileSpec::new("maps/wood.png.pz")
            .with_overrides(FileOverrides::default().with_compress(Some(false)));
        let file = PackFile::new(spec, &classifier(), &SearchPath::new());
        assert!(!file.flags.compress);
    }

    #[test]
    fn test_executable_resolved_along_search_path() {
        let libs = TempDir::new().unwrap();
        std::fs::write(libs.path().join("libfoo.so"), b"\x7fELF").unwrap();
        let mut path = SearchPath::new();
        path.append_directory(libs.path());

        let file = PackFile::new(
            PackFileSpec::implicit("libfoo.so").with_target("libfoo.so"),
            &classifier(),
            &path,
        );
        assert!(file.flags.executable);
        assert_eq!(
            file.source,
            libs.path().join("libfoo.so").canonicalize().unwrap()
        );
        assert!(file.is_available());
    }

    #[test]
    fn test_inline_text() {
        let file = PackFile::new(
            PackFileSpec::new("generated.txt").with_text(Some("hello".to_string())),
            &classifier(),
            &SearchPath::new(),
        );
        assert!(file.is_available());
        assert_eq!(file.read_contents().unwrap(), b"hello");
        assert_eq!(file.timestamp(), 0);
    }

    #[test]
    fn test_cleanup_removes_temporaries_only() {
        let temp = TempDir::new().unwrap();
        let kept = temp.path().join("kept.txt");
        let scratch = temp.path().join("scratch.txt");
        std::fs::write(&kept, b"a").unwrap();
        std::fs::write(&scratch, b"b").unwrap();

        PackFile::new(PackFileSpec::new(&kept), &classifier(), &SearchPath::new()).cleanup();
        PackFile::new(
            PackFileSpec::new(&scratch).with_delete_temp(true),
            &classifier(),
            &SearchPath::new(),
        )
        .cleanup();

        assert!(kept.exists());
        assert!(!scratch.exists());
    }
}
