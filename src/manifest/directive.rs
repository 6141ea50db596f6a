// src/manifest/directive.rs

//! Typed manifest directives

use crate::package::PackageKind;
use std::fmt;

/// One manifest instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    BeginPackage {
        name: String,
        kind: PackageKind,
    },
    EndPackage,
    /// Key/value pairs, values already normalized
    Config(Vec<(String, String)>),
    Require {
        names: Vec<String>,
        version: Option<String>,
        host: Option<String>,
    },
    Module {
        names: Vec<String>,
    },
    RenameModule {
        module: String,
        new_name: String,
    },
    ExcludeModule {
        names: Vec<String>,
        forbid: bool,
        allow_children: bool,
    },
    MainModule {
        module: String,
        new_name: Option<String>,
        filename: Option<String>,
    },
    Freeze {
        filename: String,
        compile_to_exe: bool,
    },
    File(FileDirective),
    Exclude {
        pattern: String,
    },
    Dir {
        dirname: String,
        new_dir: Option<String>,
        unprocessed: Option<bool>,
    },
}

/// Arguments of a `file` directive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDirective {
    pub names: Vec<String>,
    pub text: Option<String>,
    pub new_name: Option<String>,
    pub new_dir: Option<String>,
    pub extract: Option<bool>,
    pub executable: Option<bool>,
    pub delete_temp: bool,
    /// Skip globbing and extension remapping
    pub literal: bool,
}

impl Directive {
    /// Name used in diagnostics
    pub fn keyword(&self) -> &'static str {
        match self {
            Directive::BeginPackage { .. } => "package",
            Directive::EndPackage => "end_package",
            Directive::Config(_) => "config",
            Directive::Require { .. } => "require",
            Directive::Module { .. } => "module",
            Directive::RenameModule { .. } => "rename_module",
            Directive::ExcludeModule { .. } => "exclude_module",
            Directive::MainModule { .. } => "main_module",
            Directive::Freeze { .. } => "freeze",
            Directive::File(_) => "file",
            Directive::Exclude { .. } => "exclude",
            Directive::Dir { .. } => "dir",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::BeginPackage { name, kind } => write!(f, "{} {}", kind, name),
            Directive::Require { names, .. } | Directive::Module { names } => {
                write!(f, "{} {}", self.keyword(), names.join(", "))
            }
            Directive::File(file) => write!(f, "file {}", file.names.join(", ")),
            other => write!(f, "{}", other.keyword()),
        }
    }
}

/// A directive and the manifest line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    pub directive: Directive,
}
