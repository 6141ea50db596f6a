// src/files/exclude.rs

//! Exclusion of files from a package
//!
//! Explicitly added files are only ever dropped when a required package
//! already ships the same target name. Implicitly discovered files are also
//! checked against the system denylist, the package's own patterns and the
//! package's platform-specific setting.

use crate::error::Result;
use crate::files::classifier;
use crate::files::pack_file::PackFile;
use crate::platform;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::Path;

/// System libraries that must never be bundled
pub const SYSTEM_FILES: &[&str] = &[
    "kernel32.dll",
    "user32.dll",
    "wsock32.dll",
    "ws2_32.dll",
    "advapi32.dll",
    "opengl32.dll",
    "glu32.dll",
    "gdi32.dll",
    "shell32.dll",
    "ntdll.dll",
    "ws2help.dll",
    "rpcrt4.dll",
    "imm32.dll",
    "ddraw.dll",
    "shlwapi.dll",
    "secur32.dll",
    "dciman32.dll",
    "comdlg32.dll",
    "comctl32.dll",
    "ole32.dll",
    "oleaut32.dll",
    "gdiplus.dll",
    "winmm.dll",
    "libsystem.b.dylib",
    "libmathcommon.a.dylib",
    "libmx.a.dylib",
    "libstdc++.6.dylib",
];

/// Glob forms of the system denylist
pub const SYSTEM_GLOBS: &[&str] = &[
    "d3dx9_*.dll",
    "linux-gate.so*",
    "libdl.so*",
    "libm.so*",
    "libc.so*",
    "libGL.so*",
    "libGLU.so*",
    "libX*.so*",
];

fn match_options(case_sensitive: bool) -> MatchOptions {
    MatchOptions {
        case_sensitive,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// A user exclusion pattern from an `exclude` directive
#[derive(Debug, Clone)]
pub struct ExcludePattern {
    text: String,
    pattern: Pattern,
    /// Bare basename patterns match in any directory
    local_only: bool,
    case_sensitive: bool,
}

impl ExcludePattern {
    /// Compile a pattern. Directory-qualified patterns are made absolute so
    /// they can be compared with canonical source paths.
    pub fn new(text: &str, case_sensitive: bool) -> Result<Self> {
        let local_only = !text.contains('/') && !text.contains(std::path::MAIN_SEPARATOR);
        let normalized = if local_only {
            text.to_string()
        } else {
            let path = Path::new(text);
            let absolute = match path.parent().filter(|p| p.exists()) {
                Some(parent) => match path.file_name() {
                    Some(name) => platform::canonical_path(parent).join(name),
                    None => platform::canonical_path(path),
                },
                None => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
            };
            platform::slash_path(&absolute)
        };

        Ok(Self {
            text: text.to_string(),
            pattern: Pattern::new(&normalized)?,
            local_only,
            case_sensitive,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    /// Test a file's source path and target name against the pattern
    pub fn matches(&self, file: &PackFile) -> bool {
        let options = match_options(self.case_sensitive);
        if self.local_only {
            let source_base = file
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.pattern.matches_with(file.basename(), options)
                || self.pattern.matches_with(&source_base, options)
        } else {
            let source = platform::slash_path(&platform::canonical_path(&file.source));
            self.pattern.matches_with(&source, options)
                || self.pattern.matches_with(&file.target, options)
        }
    }
}

/// Package state consulted by the matcher
#[derive(Debug, Clone, Copy)]
pub struct ExclusionScope<'a> {
    /// Target names already shipped by required packages
    pub skip_filenames: &'a BTreeSet<String>,
    pub patterns: &'a [ExcludePattern],
    /// Tri-state package override; `Some(false)` drops platform-specific files
    pub platform_specific: Option<bool>,
}

/// Applies the denylist and package patterns
#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    case_sensitive: bool,
    system_files: BTreeSet<String>,
    system_globs: Vec<Pattern>,
}

impl ExclusionMatcher {
    pub fn new(case_sensitive: bool) -> Self {
        let fold = |s: &str| {
            if case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        Self {
            case_sensitive,
            system_files: SYSTEM_FILES.iter().map(|s| fold(s)).collect(),
            system_globs: SYSTEM_GLOBS
                .iter()
                .filter_map(|g| Pattern::new(g).ok())
                .collect(),
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// True if a basename is on the system denylist
    pub fn is_system_file(&self, basename: &str) -> bool {
        let name = if self.case_sensitive {
            basename.to_string()
        } else {
            basename.to_lowercase()
        };
        if self.system_files.contains(&name) {
            return true;
        }
        let options = match_options(self.case_sensitive);
        self.system_globs.iter().any(|g| g.matches_with(&name, options))
    }

    /// Decide whether `file` stays out of the package
    pub fn is_excluded(&self, file: &PackFile, scope: &ExclusionScope<'_>) -> bool {
        if scope.skip_filenames.contains(&file.target) {
            return true;
        }
        if file.explicit {
            return false;
        }

        if self.is_system_file(classifier::basename(&file.target)) {
            return true;
        }
        if scope.patterns.iter().any(|p| p.matches(file)) {
            return true;
        }
        file.flags.platform_specific && scope.platform_specific == Some(false)
    }
}
