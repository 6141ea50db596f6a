// src/deps/mod.rs

//! Shared library dependency closure
//!
//! Every executable in a package is run through the platform's dependency
//! tool. Each library it names is resolved next to the referring file or
//! along the executable search path and added as an implicit executable,
//! which is queued for scanning in turn until nothing new turns up.

pub mod parse;
pub mod tool;

pub use tool::{CommandLister, DependencyLister, DependencyTool};

use crate::env::BuildEnv;
use crate::files::classifier::{self, FileOverrides};
use crate::files::PackFileSpec;
use crate::package::{AddOutcome, Package};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Install-name prefixes that mean "relative to the referring file"
const LOADER_RELATIVE_PREFIXES: &[&str] = &["@executable_path/", "@loader_path/"];

/// Prefix resolved along the search path by basename
const RPATH_PREFIX: &str = "@rpath/";

/// Walks the executables of a package to a fixed point
#[derive(Debug)]
pub struct DependencyScanner<'a> {
    env: &'a BuildEnv,
    lister: &'a dyn DependencyLister,
}

impl<'a> DependencyScanner<'a> {
    pub fn new(env: &'a BuildEnv, lister: &'a dyn DependencyLister) -> Self {
        Self { env, lister }
    }

    /// Add the dependency closure of the package's executables. Returns the
    /// number of files added.
    pub fn scan(&self, package: &mut Package) -> usize {
        let mut queue: VecDeque<usize> = package
            .files()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.flags.executable)
            .map(|(i, _)| i)
            .collect();
        let mut scanned: HashSet<PathBuf> = HashSet::new();
        let mut added = 0;

        while let Some(index) = queue.pop_front() {
            let file = package.files()[index].clone();
            if !scanned.insert(file.source.clone()) || package.is_excluded(&file, self.env) {
                continue;
            }

            let Some(names) = self.lister.list_dependencies(&file.source) else {
                warn!("Unable to determine dependencies from {}", file.source.display());
                continue;
            };

            let own_name = file.source.file_name().map(|n| n.to_string_lossy().into_owned());
            for name in names {
                let base = classifier::basename(&name).to_string();
                if own_name.as_deref() == Some(base.as_str()) || self.env.matcher.is_system_file(&base) {
                    continue;
                }

                let source = self.resolve(&name, &file.source);
                let spec = PackFileSpec::implicit(source)
                    .with_target(base)
                    .with_overrides(FileOverrides::default().with_executable(Some(true)));
                if let AddOutcome::Added(new_index) = package.add_file(spec, self.env) {
                    debug!("{} needs {}", file.target, package.files()[new_index].target);
                    queue.push_back(new_index);
                    added += 1;
                }
            }
        }
        added
    }

    /// Find a referenced library: as an absolute path, next to the referrer,
    /// then along the executable search path. Unresolved names are returned
    /// as-is and end up reported as missing unless excluded.
    fn resolve(&self, name: &str, referrer: &Path) -> PathBuf {
        let referrer_dir = referrer.parent().unwrap_or(Path::new("."));

        for prefix in LOADER_RELATIVE_PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix) {
                return referrer_dir.join(rest);
            }
        }
        let name = name.strip_prefix(RPATH_PREFIX).unwrap_or(name);

        let path = Path::new(name);
        if path.is_absolute() && path.exists() {
            return path.to_path_buf();
        }

        let local = referrer_dir.join(path);
        if local.exists() {
            return local;
        }

        let base = Path::new(classifier::basename(name));
        if let Some(found) = self.env.executable_path.find_file(base) {
            return found;
        }
        path.to_path_buf()
    }
}
