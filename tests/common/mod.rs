// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use packsmith::deps::DependencyLister;
use packsmith::manifest::evaluate_file;
use packsmith::{BuildEnv, Collaborators, Packager, PackagerConfig, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runtime version every test packager runs with
pub const RUNTIME_VERSION: &str = "1.0";
pub const RUNTIME_HOST: &str = "https://packages.example.com";
pub const PLATFORM: &str = "linux_amd64";

/// Dependency lister answering from a fixed graph keyed by file name
#[derive(Debug, Default, Clone)]
pub struct FakeLister {
    pub graph: HashMap<String, Vec<String>>,
}

impl FakeLister {
    pub fn with(mut self, file: &str, deps: &[&str]) -> Self {
        self.graph
            .insert(file.to_string(), deps.iter().map(|d| d.to_string()).collect());
        self
    }
}

impl DependencyLister for FakeLister {
    fn list_dependencies(&self, file: &Path) -> Option<Vec<String>> {
        let name = file.file_name()?.to_string_lossy().into_owned();
        Some(self.graph.get(&name).cloned().unwrap_or_default())
    }
}

/// A source tree and an install tree inside one temp dir.
///
/// Keep the value alive for the duration of the test.
pub struct Workspace {
    pub temp: TempDir,
    pub src: PathBuf,
    pub out: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        Self { temp, src, out }
    }

    /// Write a file under the source tree
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.src.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> PackagerConfig {
        let mut config = PackagerConfig::new(&self.out, RUNTIME_VERSION, RUNTIME_HOST);
        config.platform = Some(PLATFORM.to_string());
        config.module_path = vec![self.src.clone()];
        config.host_descriptive_name = Some("Example Packages".to_string());
        config
    }

    pub fn packager(&self) -> Packager {
        self.packager_with(self.config(), FakeLister::default())
    }

    pub fn packager_with(&self, config: PackagerConfig, lister: FakeLister) -> Packager {
        let env = BuildEnv::new(config).unwrap();
        let collaborators = Collaborators::for_env(&env)
            .unwrap()
            .with_dependencies(Box::new(lister));
        let mut packager = Packager::new(env, collaborators).unwrap();
        packager.set_base_dir(&self.src);
        packager
    }

    /// Write `text` as a manifest in the source tree and run it
    pub fn run(&self, packager: &mut Packager, text: &str) -> Result<()> {
        let manifest = self.write("packages.toml", text);
        evaluate_file(packager, &manifest)
    }

    /// Run a manifest with a fresh packager and flush its contents index
    pub fn build(&self, text: &str) -> Result<Vec<packsmith::BuiltPackage>> {
        let mut packager = self.packager();
        self.run(&mut packager, text)?;
        packager.finish()
    }
}

/// Manifest building the core runtime package with one data file
pub const CORE_MANIFEST: &str = r#"
[[package]]
name = "core"
steps = [
    { file = "core.txt" },
]
"#;
