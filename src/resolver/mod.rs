// src/resolver/mod.rs

//! Requirement resolution
//!
//! Turns a `(name, platform, version, host)` request into a
//! [`RequiredPackage`]: the files and modules a dependency already ships,
//! plus its own requirements. Lookups try, in order:
//!
//! 1. the in-process cache (packages built or resolved earlier in this run)
//! 2. import descriptors under each local search directory, newest version
//!    first, taking the first whose core runtime is compatible
//! 3. a remote host, when a [`HostClient`] is configured
//!
//! Import descriptors reference further requirements, which are resolved
//! recursively. An explicit in-progress stack turns requirement cycles into
//! [`Error::RequirementCycle`].

pub mod host;

pub use host::{HostClient, HttpHostClient, RemotePackageRef};

use crate::descriptor::{ImportDescriptor, ModuleRecord, RequirementRecord};
use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::version::compare_optional;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Suffix of import descriptor files
pub const IMPORT_DESCRIPTOR_SUFFIX: &str = ".import.toml";

/// Cache key for a package request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub name: String,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub host: Option<String>,
}

impl PackageKey {
    pub fn new(name: &str, platform: Option<&str>, version: Option<&str>, host: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            platform: platform.map(str::to_string),
            version: version.map(str::to_string),
            host: host.map(str::to_string),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, " {}", version)?;
        }
        if let Some(platform) = &self.platform {
            write!(f, " ({})", platform)?;
        }
        Ok(())
    }
}

/// A package another package depends on, as seen by its dependents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredPackage {
    pub name: String,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub host: Option<String>,
    pub requires: Vec<Rc<RequiredPackage>>,
    /// Target names shipped by this package
    pub filenames: BTreeSet<String>,
    /// Modules this package exports
    pub modules: BTreeMap<String, ModuleRecord>,
    /// Where the import descriptor was read from, if any
    pub import_descriptor: Option<PathBuf>,
}

impl RequiredPackage {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn from_import_descriptor(
        descriptor: ImportDescriptor,
        path: &Path,
        requires: Vec<Rc<RequiredPackage>>,
    ) -> Self {
        Self {
            filenames: descriptor.components.into_iter().map(|c| c.filename).collect(),
            modules: descriptor
                .modules
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
            name: descriptor.name,
            platform: descriptor.platform,
            version: descriptor.version,
            host: descriptor.host,
            requires,
            import_descriptor: Some(path.to_path_buf()),
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
            platform: self.platform.clone(),
            version: self.version.clone(),
            host: self.host.clone(),
        }
    }

    /// Version of the core runtime this package is built against, found by
    /// walking its requirements
    pub fn core_version(&self, core: &str) -> Option<&str> {
        if self.name == core {
            return self.version.as_deref();
        }
        self.requires.iter().find_map(|r| r.core_version(core))
    }

    /// Requirement entry for a dependent's documents. The platform is only
    /// recorded when the dependent is itself platform-specific.
    pub fn requirement_record(&self, with_platform: bool) -> RequirementRecord {
        RequirementRecord {
            name: self.name.clone(),
            platform: if with_platform { self.platform.clone() } else { None },
            version: self.version.clone(),
            host: self.host.clone(),
        }
    }
}

fn cycle_label(entry: &(String, Option<String>)) -> String {
    match &entry.1 {
        Some(version) => format!("{} {}", entry.0, version),
        None => entry.0.clone(),
    }
}

fn platform_matches(requested: Option<&str>, candidate: Option<&str>) -> bool {
    requested.is_none() || candidate.is_none() || requested == candidate
}

/// Glob patterns for the import descriptor layouts under `dir`
fn candidate_patterns(dir: &Path, key: &PackageKey) -> Vec<String> {
    let d = glob::Pattern::escape(&dir.to_string_lossy());
    let n = glob::Pattern::escape(&key.name);
    let v = key
        .version
        .as_deref()
        .map(glob::Pattern::escape)
        .unwrap_or_else(|| "*".to_string());
    let s = IMPORT_DESCRIPTOR_SUFFIX;

    let mut patterns = Vec::new();
    if let Some(platform) = &key.platform {
        let p = glob::Pattern::escape(platform);
        patterns.push(format!("{d}/{n}/{v}/{p}/{n}.{v}.{p}{s}"));
        patterns.push(format!("{d}/{n}/{p}/{n}.{p}{s}"));
        patterns.push(format!("{d}/{n}.{v}.{p}{s}"));
        patterns.push(format!("{d}/{n}.{p}{s}"));
    }
    patterns.push(format!("{d}/{n}/{v}/{n}.{v}{s}"));
    patterns.push(format!("{d}/{n}.{v}{s}"));
    if key.version.is_none() {
        patterns.push(format!("{d}/{n}/{n}{s}"));
        patterns.push(format!("{d}/{n}{s}"));
    }
    patterns
}

fn descriptor_matches(descriptor: &ImportDescriptor, key: &PackageKey) -> bool {
    descriptor.name == key.name
        && key
            .version
            .as_ref()
            .is_none_or(|v| descriptor.version.as_ref() == Some(v))
        && platform_matches(key.platform.as_deref(), descriptor.platform.as_deref())
        && (key.host.is_none() || descriptor.host.is_none() || key.host == descriptor.host)
}

/// Resolves requirements against the cache, local search path and a remote host
#[derive(Debug)]
pub struct RequirementResolver {
    search_dirs: Vec<PathBuf>,
    core_package: String,
    import_cache: PathBuf,
    host_client: Option<Box<dyn HostClient>>,
    cache: HashMap<PackageKey, Rc<RequiredPackage>>,
    resolving: Vec<(String, Option<String>)>,
}

impl RequirementResolver {
    pub fn new(search_dirs: Vec<PathBuf>, core_package: impl Into<String>, import_cache: PathBuf) -> Self {
        Self {
            search_dirs,
            core_package: core_package.into(),
            import_cache,
            host_client: None,
            cache: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Resolver searching the install dir and the configured extra dirs
    pub fn from_env(env: &BuildEnv) -> Self {
        let mut dirs = vec![env.config.install_dir.clone()];
        for dir in &env.config.install_search {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        Self::new(dirs, env.core_package(), env.config.import_cache_dir())
    }

    pub fn with_host_client(mut self, client: Option<Box<dyn HostClient>>) -> Self {
        self.host_client = client;
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Make a package built in this run visible to later requirements
    pub fn register_built(&mut self, package: Rc<RequiredPackage>) {
        self.cache.insert(package.key(), package);
    }

    /// Resolve a requirement. `already_required` is the dependent's current
    /// requirement list, used to keep the core runtime version consistent.
    pub fn resolve(
        &mut self,
        name: &str,
        platform: Option<&str>,
        version: Option<&str>,
        host: Option<&str>,
        already_required: &[Rc<RequiredPackage>],
    ) -> Result<Option<Rc<RequiredPackage>>> {
        let requested = PackageKey::new(name, platform, version, host);
        if let Some(hit) = self.lookup_cache(&requested, already_required) {
            return Ok(Some(hit));
        }

        let found = match self.scan_search_path(&requested, already_required)? {
            Some(package) => Some(package),
            None => self.fetch_remote(&requested, already_required)?,
        };

        if let Some(package) = &found {
            debug!("Resolved {} to {}", requested, package.key());
            self.cache.insert(package.key(), Rc::clone(package));
            self.cache.insert(requested, Rc::clone(package));
        }
        Ok(found)
    }

    fn is_compatible(&self, candidate: &RequiredPackage, already_required: &[Rc<RequiredPackage>]) -> bool {
        let locked = already_required
            .iter()
            .find_map(|p| p.core_version(&self.core_package));
        match (locked, candidate.core_version(&self.core_package)) {
            (Some(locked), Some(theirs)) => locked == theirs,
            _ => true,
        }
    }

    fn lookup_cache(&self, key: &PackageKey, already_required: &[Rc<RequiredPackage>]) -> Option<Rc<RequiredPackage>> {
        if let Some(hit) = self.cache.get(key) {
            if self.is_compatible(hit, already_required) {
                return Some(Rc::clone(hit));
            }
        }

        let mut hits: Vec<&Rc<RequiredPackage>> = self
            .cache
            .values()
            .filter(|p| {
                p.name == key.name
                    && key.version.as_ref().is_none_or(|v| p.version.as_ref() == Some(v))
                    && platform_matches(key.platform.as_deref(), p.platform.as_deref())
                    && key.host.as_ref().is_none_or(|h| p.host.as_ref() == Some(h))
                    && self.is_compatible(p, already_required)
            })
            .collect();
        hits.sort_by(|a, b| compare_optional(b.version.as_deref(), a.version.as_deref()));
        hits.first().map(|p| Rc::clone(p))
    }

    fn scan_search_path(
        &mut self,
        key: &PackageKey,
        already_required: &[Rc<RequiredPackage>],
    ) -> Result<Option<Rc<RequiredPackage>>> {
        let mut paths = BTreeSet::new();
        for dir in &self.search_dirs {
            for pattern in candidate_patterns(dir, key) {
                match glob::glob(&pattern) {
                    Ok(entries) => paths.extend(entries.flatten()),
                    Err(e) => debug!("Bad search pattern {}: {}", pattern, e),
                }
            }
        }

        let mut candidates = Vec::new();
        for path in paths {
            match ImportDescriptor::from_file(&path) {
                Ok(descriptor) if descriptor_matches(&descriptor, key) => candidates.push((path, descriptor)),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable import descriptor: {}", e),
            }
        }

        // Newest first; a platform-specific build beats a generic one
        candidates.sort_by(|(_, a), (_, b)| {
            compare_optional(b.version.as_deref(), a.version.as_deref())
                .then_with(|| b.platform.is_some().cmp(&a.platform.is_some()))
        });

        for (path, descriptor) in candidates {
            let package = match self.load_descriptor(&path, descriptor) {
                Ok(package) => package,
                Err(e @ Error::RequirementCycle(_)) => return Err(e),
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if self.is_compatible(&package, already_required) {
                return Ok(Some(package));
            }
            debug!("Skipping {}: built against a different core runtime", path.display());
        }
        Ok(None)
    }

    fn fetch_remote(
        &mut self,
        key: &PackageKey,
        already_required: &[Rc<RequiredPackage>],
    ) -> Result<Option<Rc<RequiredPackage>>> {
        let local = {
            let (Some(client), Some(host)) = (&self.host_client, key.host.as_deref()) else {
                return Ok(None);
            };
            let Some(remote) =
                client.get_package(host, &key.name, key.version.as_deref(), key.platform.as_deref())?
            else {
                return Ok(None);
            };

            let relative = Path::new(&remote.import_file.filename);
            if relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
            {
                return Err(Error::DownloadError(format!(
                    "refusing unsafe descriptor path {} from {}",
                    remote.import_file.filename, host
                )));
            }
            let local = self.import_cache.join(relative);
            if !client.freshen_file(&remote, &local)? {
                warn!("Could not fetch {} from {}", key, host);
                return Ok(None);
            }
            local
        };

        info!("Using remote package {} from {}", key, local.display());
        let package = self.read_import_descriptor(&local)?;
        if !self.is_compatible(&package, already_required) {
            debug!("Remote {} is built against a different core runtime", key);
            return Ok(None);
        }
        Ok(Some(package))
    }

    /// Read an import descriptor and resolve its requirements recursively
    pub fn read_import_descriptor(&mut self, path: &Path) -> Result<Rc<RequiredPackage>> {
        let descriptor = ImportDescriptor::from_file(path)?;
        self.load_descriptor(path, descriptor)
    }

    fn load_descriptor(&mut self, path: &Path, descriptor: ImportDescriptor) -> Result<Rc<RequiredPackage>> {
        let marker = (descriptor.name.clone(), descriptor.version.clone());
        if self.resolving.contains(&marker) {
            let mut chain: Vec<String> = self.resolving.iter().map(cycle_label).collect();
            chain.push(cycle_label(&marker));
            return Err(Error::RequirementCycle(chain.join(" -> ")));
        }

        self.resolving.push(marker);
        let requires = self.resolve_requirements(&descriptor);
        self.resolving.pop();

        Ok(Rc::new(RequiredPackage::from_import_descriptor(
            descriptor,
            path,
            requires?,
        )))
    }

    fn resolve_requirements(&mut self, descriptor: &ImportDescriptor) -> Result<Vec<Rc<RequiredPackage>>> {
        let mut requires: Vec<Rc<RequiredPackage>> = Vec::new();
        for record in &descriptor.requires {
            let platform = record.platform.as_deref().or(descriptor.platform.as_deref());
            let resolved = self.resolve(
                &record.name,
                platform,
                record.version.as_deref(),
                record.host.as_deref(),
                &requires,
            )?;
            match resolved {
                Some(package) => requires.push(package),
                None => {
                    return Err(Error::UnknownPackage {
                        name: record.name.clone(),
                        version: record.version.clone().unwrap_or_default(),
                    });
                }
            }
        }
        Ok(requires)
    }
}
