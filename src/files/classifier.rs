// src/files/classifier.rs

//! Extension-driven file policy
//!
//! Decides, from a target name's extension, whether a file is compressed in
//! the archive, extracted to disk at runtime, platform-specific, executable,
//! or passed through unprocessed. Caller overrides always win.

use crate::config::ExtensionConfig;
use crate::platform::HostFamily;
use std::collections::BTreeSet;

/// Suffix marking a target that must be stored compressed
pub const PZ_SUFFIX: &str = ".pz";

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "tif", "tiff", "tga", "gif", "rgb", "rgba", "sgi", "pnm",
    "ppm", "pgm", "pbm", "dds", "exr", "hdr",
];
const MODEL_EXTENSIONS: &[&str] = &["egg", "bam"];
const TEXT_EXTENSIONS: &[&str] = &["prc", "ptf", "txt"];
const BINARY_EXTENSIONS: &[&str] = &["ttf", "wav", "mid"];
const UNCOMPRESSIBLE_EXTENSIONS: &[&str] = &["mp3", "ogg"];

/// Extension of module source files
pub const SOURCE_EXTENSION: &str = "py";
/// Extension of schema (IDL) files
pub const SCHEMA_EXTENSION: &str = "dc";
/// Extension of config text files
pub const CONFIG_TEXT_EXTENSION: &str = "prc";
/// Extension of encrypted config text files
pub const ENCRYPTED_CONFIG_EXTENSION: &str = "pre";
/// Model source format, converted to the binary format on the way in
pub const MODEL_SOURCE_EXTENSION: &str = "egg";
/// Binary model format
pub const MODEL_BINARY_EXTENSION: &str = "bam";

/// Flags controlling how one file is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFlags {
    pub compress: bool,
    pub executable: bool,
    pub extract: bool,
    pub platform_specific: bool,
    pub unprocessed: bool,
}

/// Explicit caller choices; `None` means "derive from the extension"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileOverrides {
    pub compress: Option<bool>,
    pub executable: Option<bool>,
    pub extract: Option<bool>,
    pub platform_specific: Option<bool>,
    pub unprocessed: Option<bool>,
}

impl FileOverrides {
    pub fn with_extract(mut self, extract: Option<bool>) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_executable(mut self, executable: Option<bool>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_unprocessed(mut self, unprocessed: Option<bool>) -> Self {
        self.unprocessed = unprocessed;
        self
    }

    pub fn with_compress(mut self, compress: Option<bool>) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_platform_specific(mut self, platform_specific: Option<bool>) -> Self {
        self.platform_specific = platform_specific;
        self
    }
}

/// The extension sets in force for one host family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTable {
    pub image: BTreeSet<String>,
    pub model: BTreeSet<String>,
    pub text: BTreeSet<String>,
    pub binary: BTreeSet<String>,
    pub uncompressible: BTreeSet<String>,
    pub unprocessed: BTreeSet<String>,
    pub executable: BTreeSet<String>,
    pub extract: BTreeSet<String>,
    pub platform_specific: BTreeSet<String>,
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ExtensionTable {
    /// Built-in tables for a family
    pub fn for_family(family: HostFamily) -> Self {
        let executable = set(family.executable_extensions());
        Self {
            image: set(IMAGE_EXTENSIONS),
            model: set(MODEL_EXTENSIONS),
            text: set(TEXT_EXTENSIONS),
            binary: set(BINARY_EXTENSIONS),
            uncompressible: set(UNCOMPRESSIBLE_EXTENSIONS),
            unprocessed: BTreeSet::new(),
            extract: executable.clone(),
            platform_specific: executable.clone(),
            executable,
        }
    }

    /// Built-in tables extended with configured extras
    pub fn with_config(mut self, extra: &ExtensionConfig) -> Self {
        let lower = |v: &Vec<String>| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        self.uncompressible.extend(lower(&extra.uncompressible));
        self.unprocessed.extend(lower(&extra.unprocessed));
        self.extract.extend(lower(&extra.extract));
        self.platform_specific.extend(lower(&extra.platform_specific));
        self
    }

    /// Extensions picked up when recursing a directory
    pub fn is_known(&self, ext: &str) -> bool {
        [
            &self.image,
            &self.model,
            &self.text,
            &self.binary,
            &self.uncompressible,
            &self.unprocessed,
            &self.executable,
            &self.extract,
            &self.platform_specific,
        ]
        .iter()
        .any(|s| s.contains(ext))
            || ext == SCHEMA_EXTENSION
    }
}

/// Lowercase extension of the basename of `name`, without the dot
pub fn extension_of(name: &str) -> String {
    let base = basename(name);
    match base.rfind('.') {
        Some(pos) if pos > 0 => base[pos + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Last `/`-separated component of a target name
pub fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Strip a trailing `.pz` marker. Returns the remaining name and whether the
/// marker was present.
pub fn strip_pz(name: &str) -> (String, bool) {
    match name.strip_suffix(PZ_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => (stripped.to_string(), true),
        _ => (name.to_string(), false),
    }
}

/// Applies the extension tables to target names
#[derive(Debug, Clone)]
pub struct FileClassifier {
    table: ExtensionTable,
}

impl FileClassifier {
    pub fn new(table: ExtensionTable) -> Self {
        Self { table }
    }

    pub fn for_family(family: HostFamily) -> Self {
        Self::new(ExtensionTable::for_family(family))
    }

    pub fn table(&self) -> &ExtensionTable {
        &self.table
    }

    /// Derive storage flags for `target`, honoring explicit overrides.
    ///
    /// `target` must already have any `.pz` marker stripped; the caller
    /// forces `compress` in that case.
    pub fn classify(&self, target: &str, overrides: &FileOverrides) -> FileFlags {
        let ext = extension_of(target);
        let t = &self.table;

        let executable = overrides
            .executable
            .unwrap_or_else(|| t.executable.contains(&ext));
        let compress = overrides
            .compress
            .unwrap_or_else(|| !(t.uncompressible.contains(&ext) || t.image.contains(&ext)));
        let extract = overrides
            .extract
            .unwrap_or_else(|| executable || t.extract.contains(&ext));
        let platform_specific = overrides
            .platform_specific
            .unwrap_or_else(|| executable || t.platform_specific.contains(&ext));
        let unprocessed = overrides
            .unprocessed
            .unwrap_or_else(|| executable || t.unprocessed.contains(&ext));

        FileFlags {
            compress,
            executable,
            extract,
            platform_specific,
            unprocessed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_text() {
        let classifier = FileClassifier::for_family(HostFamily::Posix);
        let flags = classifier.classify("docs/readme.txt", &FileOverrides::default());
        assert_eq!(
            flags,
            FileFlags {
                compress: true,
                ..FileFlags::default()
            }
        );
    }

    #[test]
    fn test_images_and_audio_are_not_compressed() {
        let classifier = FileClassifier::for_family(HostFamily::Posix);
        assert!(!classifier.classify("maps/wood.PNG", &FileOverrides::default()).compress);
        assert!(!classifier.classify("music/theme.ogg", &FileOverrides::default()).compress);
    }

    #[test]
    fn test_executables_per_family() {
        let posix = FileClassifier::for_family(HostFamily::Posix);
        let flags = posix.classify("libfoo.so", &FileOverrides::default());
        assert!(flags.executable && flags.extract && flags.platform_specific && flags.unprocessed);
        assert!(!posix.classify("foo.dll", &FileOverrides::default()).executable);

        let windows = FileClassifier::for_family(HostFamily::Windows);
        assert!(windows.classify("foo.dll", &FileOverrides::default()).executable);
        assert!(windows.classify("tool.exe", &FileOverrides::default()).executable);

        let mac = FileClassifier::for_family(HostFamily::MacOs);
        assert!(mac.classify("libfoo.dylib", &FileOverrides::default()).executable);
    }

    #[test]
    fn test_overrides_win() {
        let classifier = FileClassifier::for_family(HostFamily::Posix);
        let overrides = FileOverrides::default()
            .with_executable(Some(false))
            .with_compress(Some(true))
            .with_extract(Some(true));
        let flags = classifier.classify("libfoo.so", &overrides);
        assert!(!flags.executable);
        assert!(flags.compress);
        assert!(flags.extract);
        // Still platform-specific by extension, but no longer passed through
        assert!(flags.platform_specific);
        assert!(!flags.unprocessed);
    }

    #[test]
    fn test_strip_pz() {
        assert_eq!(strip_pz("maps/wood.png.pz"), ("maps/wood.png".to_string(), true));
        assert_eq!(strip_pz("maps/wood.png"), ("maps/wood.png".to_string(), false));
        assert_eq!(strip_pz(".pz"), (".pz".to_string(), false));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a/b/model.EGG"), "egg");
        assert_eq!(extension_of("a.dir/noext"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn test_config_extras() {
        let extra = ExtensionConfig {
            uncompressible: vec!["FLAC".to_string()],
            ..ExtensionConfig::default()
        };
        let table = ExtensionTable::for_family(HostFamily::Posix).with_config(&extra);
        assert!(table.is_known("flac"));
        let classifier = FileClassifier::new(table);
        assert!(!classifier.classify("song.flac", &FileOverrides::default()).compress);
    }
}
