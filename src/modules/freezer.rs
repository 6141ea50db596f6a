// src/modules/freezer.rs

//! Code freezing
//!
//! The [`Freezer`] trait is the seam to whatever turns module sources into
//! loadable blobs. [`SourceFreezer`] is the built-in implementation: it
//! locates module sources along a search path and packs them into a single
//! CBOR blob, reporting native extension modules as extras.

use crate::error::{Error, Result};
use crate::platform::HostFamily;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the synthetic entry-point module
pub const MAIN_MODULE_NAME: &str = "__main__";

/// Archive entry holding the frozen module blob
pub const FROZEN_MODULES_ENTRY: &str = "__modules__.frozen";

/// Header line written in front of frozen executables
pub const RUNTIME_HEADER: &str = "#! /usr/bin/env packsmith-run\n";

/// Where a module definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleOrigin {
    /// Added or excluded by this package
    #[default]
    Declared,
    /// Already provided by a required package
    Skip,
}

/// The freezer's view of one module
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleDef {
    /// Name the module is imported under at its source location
    pub source_name: String,
    pub filename: Option<PathBuf>,
    /// Added as a side effect of another module or file
    pub implicit: bool,
    /// Only guessed to be a module (turned out to be a symbol)
    pub guess: bool,
    pub exclude: bool,
    pub forbid: bool,
    pub allow_children: bool,
    pub origin: ModuleOrigin,
}

impl ModuleDef {
    fn named(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            ..Self::default()
        }
    }
}

/// Turns module sources into loadable blobs
pub trait Freezer: fmt::Debug {
    /// Register a module. Known modules are left untouched unless they were
    /// excluded and this is an explicit request.
    fn add_module(&mut self, name: &str, new_name: Option<&str>, source: Option<&Path>, implicit: bool);

    fn exclude_module(&mut self, name: &str, allow_children: bool, forbid: bool, origin: ModuleOrigin);

    fn has_module(&self, name: &str) -> bool;

    /// Resolve every registered module; modules that cannot be found end up
    /// excluded and implicit.
    fn done(&mut self, compile_to_exe: bool) -> Result<()>;

    /// Entries to embed in the package archive
    fn archive_entries(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// Write a standalone frozen artifact into `out_dir`
    fn generate_code(&mut self, base_name: &str, out_dir: &Path, compile_to_exe: bool) -> Result<PathBuf>;

    /// Module table keyed by the name modules are stored under
    fn modules(&self) -> &BTreeMap<String, ModuleDef>;

    /// Native extension modules discovered by `done`, as (module, file)
    fn extras(&self) -> &[(String, PathBuf)];

    fn reset(&mut self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrozenModule {
    source: String,
    is_package: bool,
}

enum Located {
    Source { path: PathBuf, is_package: bool },
    Native(PathBuf),
}

/// Freezer that packs module sources found along a search path
#[derive(Debug, Clone)]
pub struct SourceFreezer {
    search_path: Vec<PathBuf>,
    native_extensions: Vec<&'static str>,
    modules: BTreeMap<String, ModuleDef>,
    frozen: BTreeMap<String, FrozenModule>,
    extras: Vec<(String, PathBuf)>,
}

impl SourceFreezer {
    pub fn new(search_path: Vec<PathBuf>, family: HostFamily) -> Self {
        let native_extensions = match family {
            HostFamily::Windows => vec!["pyd", "dll"],
            HostFamily::MacOs => vec!["so", "dylib"],
            HostFamily::Posix => vec!["so"],
        };
        Self {
            search_path,
            native_extensions,
            modules: BTreeMap::new(),
            frozen: BTreeMap::new(),
            extras: Vec::new(),
        }
    }

    fn locate(&self, module: &str) -> Option<Located> {
        let rel: PathBuf = module.split('.').collect();
        for root in &self.search_path {
            let base = root.join(&rel);
            let file = base.with_extension("py");
            if file.is_file() {
                return Some(Located::Source {
                    path: file,
                    is_package: false,
                });
            }
            let init = base.join("__init__.py");
            if init.is_file() {
                return Some(Located::Source {
                    path: init,
                    is_package: true,
                });
            }
            for ext in &self.native_extensions {
                let native = base.with_extension(ext);
                if native.is_file() {
                    return Some(Located::Native(native));
                }
            }
        }
        None
    }

    fn freeze_source(&mut self, name: &str, path: &Path, is_package: bool) -> Result<()> {
        let bytes = fs::read(path)
            .map_err(|e| Error::IoError(format!("cannot read module {}: {}", path.display(), e)))?;
        self.frozen.insert(
            name.to_string(),
            FrozenModule {
                source: String::from_utf8_lossy(&bytes).into_owned(),
                is_package,
            },
        );
        Ok(())
    }

    fn blob(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        ciborium::into_writer(&self.frozen, &mut buffer)
            .map_err(|e| Error::IoError(format!("cannot encode frozen modules: {}", e)))?;
        Ok(buffer)
    }
}

impl Freezer for SourceFreezer {
    fn add_module(&mut self, name: &str, new_name: Option<&str>, source: Option<&Path>, implicit: bool) {
        let key = new_name.unwrap_or(name).to_string();
        if let Some(existing) = self.modules.get(&key) {
            if !(existing.exclude && !implicit) {
                return;
            }
        }
        let mut def = ModuleDef::named(name);
        def.filename = source.map(Path::to_path_buf);
        def.implicit = implicit;
        self.modules.insert(key, def);
    }

    fn exclude_module(&mut self, name: &str, allow_children: bool, forbid: bool, origin: ModuleOrigin) {
        let mut def = ModuleDef::named(name);
        def.exclude = true;
        def.allow_children = allow_children;
        def.forbid = forbid;
        def.origin = origin;
        self.modules.insert(name.to_string(), def);
    }

    fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    fn done(&mut self, compile_to_exe: bool) -> Result<()> {
        debug!("Freezing {} modules (executable: {})", self.modules.len(), compile_to_exe);

        let mut queue: VecDeque<String> = self
            .modules
            .iter()
            .filter(|(name, def)| !def.exclude && !self.frozen.contains_key(*name))
            .map(|(name, _)| name.clone())
            .collect();
        let mut unresolved = Vec::new();

        while let Some(name) = queue.pop_front() {
            let Some(def) = self.modules.get(&name).cloned() else {
                continue;
            };
            if def.exclude || self.frozen.contains_key(&name) {
                continue;
            }

            // Parents of a dotted module are needed to import it
            if let Some((parent, _)) = name.rsplit_once('.') {
                if !self.modules.contains_key(parent) {
                    self.add_module(parent, None, None, true);
                    queue.push_back(parent.to_string());
                }
            }

            let located = match &def.filename {
                Some(path) => Some(Located::Source {
                    is_package: path.file_stem().is_some_and(|s| s == "__init__"),
                    path: path.clone(),
                }),
                None => self.locate(&def.source_name),
            };

            match located {
                Some(Located::Source { path, is_package }) => {
                    self.freeze_source(&name, &path, is_package)?;
                    if let Some(entry) = self.modules.get_mut(&name) {
                        entry.filename = Some(path);
                    }
                }
                Some(Located::Native(path)) => {
                    if !self.extras.iter().any(|(m, _)| *m == name) {
                        self.extras.push((name.clone(), path.clone()));
                    }
                    if let Some(entry) = self.modules.get_mut(&name) {
                        entry.filename = Some(path);
                    }
                }
                None => unresolved.push(name),
            }
        }

        for name in unresolved {
            let parent_found = name
                .rsplit_once('.')
                .is_some_and(|(parent, _)| self.frozen.contains_key(parent));
            let Some(def) = self.modules.get_mut(&name) else {
                continue;
            };
            if def.implicit && parent_found {
                // `from a import b` where b is a symbol of a
                def.guess = true;
                continue;
            }
            if !def.implicit {
                warn!("Module {} not found", name);
            }
            def.exclude = true;
            def.implicit = true;
        }
        Ok(())
    }

    fn archive_entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        if self.frozen.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![(FROZEN_MODULES_ENTRY.to_string(), self.blob()?)])
    }

    fn generate_code(&mut self, base_name: &str, out_dir: &Path, compile_to_exe: bool) -> Result<PathBuf> {
        let blob = self.blob()?;
        let path = if compile_to_exe {
            out_dir.join(base_name)
        } else {
            out_dir.join(format!("{}.frozen", base_name))
        };

        let mut data = Vec::with_capacity(blob.len() + RUNTIME_HEADER.len());
        if compile_to_exe {
            data.extend_from_slice(RUNTIME_HEADER.as_bytes());
        }
        data.extend_from_slice(&blob);
        fs::write(&path, data)?;

        #[cfg(unix)]
        if compile_to_exe {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }

    fn modules(&self) -> &BTreeMap<String, ModuleDef> {
        &self.modules
    }

    fn extras(&self) -> &[(String, PathBuf)] {
        &self.extras
    }

    fn reset(&mut self) {
        self.modules.clear();
        self.frozen.clear();
        self.extras.clear();
    }
}

/// Decode a blob written by [`SourceFreezer`] into (module, is_package) pairs
pub fn frozen_module_names(blob: &[u8]) -> Result<Vec<(String, bool)>> {
    let frozen: BTreeMap<String, FrozenModule> = ciborium::from_reader(blob)
        .map_err(|e| Error::ParseError(format!("invalid frozen module blob: {}", e)))?;
    Ok(frozen
        .into_iter()
        .map(|(name, module)| (name, module.is_package))
        .collect())
}
