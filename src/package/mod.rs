// src/package/mod.rs

//! The package under construction
//!
//! A [`Package`] collects files, requirements, exclusions and config while
//! its directives run. Closing it hands it to the [`ContentAssembler`] (or
//! the solo installer), which drives the write passes exactly once.

pub mod assembler;
pub mod handlers;
pub mod layout;
pub mod solo;

pub use assembler::{AssemblyContext, ContentAssembler, InstalledPackage};
pub use handlers::{ContentHandler, HandlerRegistry, Phase};
pub use layout::PackageLayout;

use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::files::classifier::FileOverrides;
use crate::files::{ExcludePattern, ExclusionScope, PackFile, PackFileSpec};
use crate::modules::{Freezer, ModuleRegistry};
use crate::resolver::{PackageKey, RequiredPackage};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// What a package installs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// Multifile library other packages can require
    Library,
    /// Self-executing multifile with a main module
    Application,
    /// A single file copied into the install tree
    Solo,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Library => write!(f, "package"),
            PackageKind::Application => write!(f, "application"),
            PackageKind::Solo => write!(f, "solo package"),
        }
    }
}

/// Build progress of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PackageState {
    Empty,
    FilesDeclared,
    Closing,
    MultifileWritten,
    DescriptorsWritten,
    Done,
}

/// Result of [`Package::add_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored at this index of the file list
    Added(usize),
    /// Same source was added before
    AlreadyPresent,
    /// Another source already claimed the target
    Shadowed { existing: PathBuf },
    /// Source does not exist
    Missing,
}

/// Module an application starts from, and the name it runs under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainModule {
    pub module: String,
    pub new_name: String,
}

/// Normalize a config value: booleans become `1`/`0`
pub fn normalize_config_value(value: &str) -> String {
    match value.to_ascii_lowercase().as_str() {
        "true" => "1".to_string(),
        "false" => "0".to_string(),
        _ => value.to_string(),
    }
}

fn parse_tristate(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub kind: PackageKind,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub host: Option<String>,
    /// Compression level used for compressible archive entries
    pub compression_level: u32,
    pub main_module: Option<MainModule>,
    pub configs: BTreeMap<String, String>,
    /// Package-level override of platform-specific-ness
    pub platform_specific: Option<bool>,
    /// Flattened requirements, dependencies before dependents
    pub requires: Vec<Rc<RequiredPackage>>,
    /// Targets already shipped by a requirement
    pub skip_filenames: BTreeSet<String>,
    pub modules: ModuleRegistry,
    excluded: Vec<ExcludePattern>,
    files: Vec<PackFile>,
    sources: HashSet<PathBuf>,
    targets: HashMap<String, usize>,
    missing: Vec<PathBuf>,
    scratch: Option<TempDir>,
    state: PackageState,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: PackageKind, freezer: Box<dyn Freezer>, env: &BuildEnv) -> Self {
        Self {
            name: name.into(),
            kind,
            version: None,
            platform: None,
            host: Some(env.host.clone()).filter(|h| !h.is_empty()),
            compression_level: 0,
            main_module: None,
            configs: BTreeMap::new(),
            platform_specific: None,
            requires: Vec::new(),
            skip_filenames: BTreeSet::new(),
            modules: ModuleRegistry::new(freezer),
            excluded: Vec::new(),
            files: Vec::new(),
            sources: HashSet::new(),
            targets: HashMap::new(),
            missing: Vec::new(),
            scratch: None,
            state: PackageState::Empty,
        }
    }

    pub fn is_application(&self) -> bool {
        self.kind == PackageKind::Application
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PackageState) {
        debug!("{}: {:?} -> {:?}", self.name, self.state, state);
        self.state = state;
    }

    /// Enter the closing state. A package closes exactly once.
    pub fn begin_close(&mut self) -> Result<()> {
        if self.state >= PackageState::Closing {
            return Err(Error::PackageError(format!(
                "package {} is already closed",
                self.name
            )));
        }
        self.set_state(PackageState::Closing);
        Ok(())
    }

    pub fn files(&self) -> &[PackFile] {
        &self.files
    }

    /// Sources that were declared but did not exist
    pub fn missing(&self) -> &[PathBuf] {
        &self.missing
    }

    pub fn exclusion_patterns(&self) -> &[ExcludePattern] {
        &self.excluded
    }

    /// Add a file to the package.
    ///
    /// The first file for a source and the first file for a target win;
    /// later ones are dropped. A missing source is reported unless it would
    /// have been excluded anyway.
    pub fn add_file(&mut self, spec: PackFileSpec, env: &BuildEnv) -> AddOutcome {
        let file = PackFile::new(spec, &env.classifier, &env.executable_path);
        if !self.sources.insert(file.source.clone()) {
            return AddOutcome::AlreadyPresent;
        }

        if !file.is_available() {
            if !self.is_excluded(&file, env) {
                warn!("No such file: {}", file.source.display());
                self.missing.push(file.source.clone());
            }
            return AddOutcome::Missing;
        }

        let key = file.target.to_lowercase();
        if let Some(&existing) = self.targets.get(&key) {
            let existing = self.files[existing].source.clone();
            if existing != file.source {
                warn!("{} is shadowing {}", existing.display(), file.source.display());
            }
            return AddOutcome::Shadowed { existing };
        }

        let index = self.files.len();
        self.targets.insert(key, index);
        self.files.push(file);
        if self.state == PackageState::Empty {
            self.state = PackageState::FilesDeclared;
        }
        AddOutcome::Added(index)
    }

    pub fn file_by_source(&self, source: &Path) -> Option<&PackFile> {
        self.files.iter().find(|f| f.source == source)
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.targets.contains_key(&target.to_lowercase())
    }

    /// Add a user exclusion pattern
    pub fn exclude_file(&mut self, pattern: &str, env: &BuildEnv) -> Result<()> {
        self.excluded
            .push(ExcludePattern::new(pattern, env.matcher.is_case_sensitive())?);
        Ok(())
    }

    pub fn is_excluded(&self, file: &PackFile, env: &BuildEnv) -> bool {
        let scope = ExclusionScope {
            skip_filenames: &self.skip_filenames,
            patterns: &self.excluded,
            platform_specific: self.platform_specific,
        };
        env.matcher.is_excluded(file, &scope)
    }

    /// Require `package` and, transitively, everything it requires. Their
    /// files and modules are skipped by this package.
    pub fn require_package(&mut self, package: &Rc<RequiredPackage>) {
        let mut seen: HashSet<PackageKey> = self.requires.iter().map(|r| r.key()).collect();
        self.flatten_requirement(package, &mut seen);
    }

    fn flatten_requirement(&mut self, package: &Rc<RequiredPackage>, seen: &mut HashSet<PackageKey>) {
        if !seen.insert(package.key()) {
            return;
        }
        for inner in &package.requires {
            self.flatten_requirement(inner, seen);
        }
        self.skip_filenames.extend(package.filenames.iter().cloned());
        self.modules.register_skips(package);
        self.requires.push(Rc::clone(package));
    }

    /// Version of the core runtime among this package's requirements
    pub fn required_core_version(&self, core: &str) -> Option<&str> {
        self.requires
            .iter()
            .find(|r| r.name == core)
            .and_then(|r| r.version.as_deref())
    }

    /// Move the tri-state `platform_specific` config into its field
    pub fn take_platform_override(&mut self) {
        if let Some(value) = self.configs.remove("platform_specific") {
            self.platform_specific = parse_tristate(&value);
        }
    }

    /// Add the native extension modules reported by the freezer as files.
    /// Module `a.b.c` from `/x/c.so` is stored as `a/b/c.so`.
    pub fn add_extension_modules(&mut self, env: &BuildEnv) {
        let extras: Vec<(String, PathBuf)> = self.modules.freezer().extras().to_vec();
        for (module, path) in extras {
            let base = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = match module.rsplit_once('.') {
                Some((parent, _)) => format!("{}/{}", parent.replace('.', "/"), base),
                None => base,
            };
            let overrides = FileOverrides::default()
                .with_extract(Some(true))
                .with_executable(Some(true))
                .with_platform_specific(Some(true));
            self.add_file(
                PackFileSpec::implicit(path)
                    .with_target(target)
                    .with_overrides(overrides),
                env,
            );
        }
    }

    /// Decide whether the package is platform-specific and, if so, give it
    /// the build platform
    pub fn consider_platform(&mut self, env: &BuildEnv) {
        let mut specific = self.platform_specific == Some(true);
        if !specific {
            specific = self
                .files
                .iter()
                .any(|f| f.flags.platform_specific && !self.is_excluded(f, env));
        }
        if specific && self.platform_specific != Some(false) && self.platform.is_none() {
            debug!("{} is platform-specific ({})", self.name, env.platform);
            self.platform = Some(env.platform.clone());
        }
    }

    /// Per-package scratch directory, removed when the package is done
    pub fn scratch_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.scratch {
            return Ok(dir.path().to_path_buf());
        }
        let prefix = format!("packsmith-{}-", self.name);
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir()
            .map_err(|e| Error::IoError(format!("cannot create scratch dir: {}", e)))?;
        let path = dir.path().to_path_buf();
        self.scratch = Some(dir);
        Ok(path)
    }

    /// Delete temporaries and the scratch dir
    pub fn cleanup(&mut self) {
        for file in &self.files {
            file.cleanup();
        }
        if let Some(dir) = self.scratch.take() {
            if let Err(e) = dir.close() {
                warn!("Could not remove scratch dir: {}", e);
            }
        }
        self.state = PackageState::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackagerConfig;
    use crate::descriptor::ModuleRecord;
    use crate::modules::SourceFreezer;
    use std::fs;
    use tempfile::TempDir;

    fn env(install: &Path) -> BuildEnv {
        let mut config = PackagerConfig::new(install, "1.0", "https://h");
        config.platform = Some("linux_amd64".to_string());
        BuildEnv::new(config).unwrap()
    }

    fn package(env: &BuildEnv, name: &str) -> Package {
        let freezer = SourceFreezer::new(Vec::new(), env.family);
        Package::new(name, PackageKind::Library, Box::new(freezer), env)
    }

    #[test]
    fn test_add_file_is_idempotent_per_source() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let src = temp.path().join("readme.txt");
        fs::write(&src, "hi").unwrap();

        let mut pkg = package(&env, "docs");
        assert_eq!(pkg.add_file(PackFileSpec::new(&src).with_target("readme.txt"), &env), AddOutcome::Added(0));
        assert_eq!(
            pkg.add_file(PackFileSpec::new(&src).with_target("other.txt"), &env),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(pkg.files().len(), 1);
        assert_eq!(pkg.files()[0].target, "readme.txt");
        assert_eq!(pkg.state(), PackageState::FilesDeclared);
    }

    #[test]
    fn test_first_target_wins_case_insensitively() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let mut pkg = package(&env, "docs");
        pkg.add_file(PackFileSpec::new(&a).with_target("Notes.txt"), &env);
        let outcome = pkg.add_file(PackFileSpec::new(&b).with_target("notes.TXT"), &env);
        assert!(matches!(outcome, AddOutcome::Shadowed { .. }));
        assert_eq!(pkg.files().len(), 1);
        assert_eq!(pkg.files()[0].source, a.canonicalize().unwrap());
        assert!(pkg.has_target("NOTES.txt"));
    }

    #[test]
    fn test_missing_file_is_recorded() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let mut pkg = package(&env, "docs");
        let ghost = temp.path().join("ghost.txt");
        assert_eq!(pkg.add_file(PackFileSpec::new(&ghost), &env), AddOutcome::Missing);
        assert!(pkg.files().is_empty());
        assert_eq!(pkg.missing().len(), 1);
    }

    #[test]
    fn test_require_flattens_transitively() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let mut base = RequiredPackage::named("base");
        base.filenames.insert("base/data.txt".to_string());
        let base = Rc::new(base);

        let mut toolkit = RequiredPackage::named("toolkit");
        toolkit.requires.push(Rc::clone(&base));
        toolkit
            .modules
            .insert("foo".to_string(), ModuleRecord::new("foo"));
        let toolkit = Rc::new(toolkit);

        let mut pkg = package(&env, "game");
        pkg.require_package(&toolkit);
        pkg.require_package(&base);

        let names: Vec<_> = pkg.requires.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["base", "toolkit"]);
        assert!(pkg.skip_filenames.contains("base/data.txt"));
        assert!(pkg.modules.is_skipped("foo"));
    }

    #[test]
    fn test_platform_specific_file_sets_platform() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let lib = temp.path().join("libgame.so");
        fs::write(&lib, b"\x7fELF").unwrap();

        let mut pkg = package(&env, "native");
        pkg.add_file(PackFileSpec::new(&lib).with_target("libgame.so"), &env);
        pkg.consider_platform(&env);
        assert_eq!(pkg.platform.as_deref(), Some("linux_amd64"));

        let mut generic = package(&env, "native");
        generic.configs.insert("platform_specific".to_string(), "0".to_string());
        generic.take_platform_override();
        generic.add_file(PackFileSpec::new(&lib).with_target("libgame.so"), &env);
        generic.consider_platform(&env);
        assert_eq!(generic.platform, None);
        assert!(!generic.configs.contains_key("platform_specific"));
    }

    #[test]
    fn test_close_happens_once() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let mut pkg = package(&env, "docs");
        pkg.begin_close().unwrap();
        assert!(pkg.begin_close().is_err());
    }

    #[test]
    fn test_config_values_normalize_booleans() {
        assert_eq!(normalize_config_value("True"), "1");
        assert_eq!(normalize_config_value("false"), "0");
        assert_eq!(normalize_config_value("My Game"), "My Game");
    }
}
