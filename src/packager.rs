// src/packager.rs

//! The packaging run
//!
//! [`Packager`] is the context object for one run: it owns the build
//! environment, the requirement cache and the contents index, and holds the
//! package currently being declared. Directives arrive through the
//! per-directive methods; `end_package` closes and installs the package.
//! [`Packager::finish`] flushes the contents index.

use crate::codec::{ConfigTextProcessor, DcCodec, ModelCodec, SceneCodec, SchemaCodec};
use crate::contents::ContentsIndex;
use crate::deps::{CommandLister, DependencyLister};
use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::files::classifier::{self, FileOverrides};
use crate::files::PackFileSpec;
use crate::manifest::FileDirective;
use crate::modules::{Freezer, ModuleOrigin, SourceFreezer, MAIN_MODULE_NAME};
use crate::package::solo::install_solo;
use crate::package::{
    normalize_config_value, ContentAssembler, HandlerRegistry, MainModule, Package, PackageKind,
};
use crate::platform::{self, HostFamily};
use crate::resolver::{HostClient, HttpHostClient, RequiredPackage, RequirementResolver};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Builds the freezer for each new package
pub type FreezerFactory = Box<dyn Fn(&BuildEnv) -> Box<dyn Freezer>>;

/// Pluggable collaborators of a run
pub struct Collaborators {
    pub schema: Box<dyn SchemaCodec>,
    pub model: Box<dyn ModelCodec>,
    pub dependencies: Box<dyn DependencyLister>,
    pub freezer_factory: FreezerFactory,
    pub host_client: Option<Box<dyn HostClient>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("schema", &self.schema)
            .field("model", &self.model)
            .field("dependencies", &self.dependencies)
            .field("host_client", &self.host_client)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// The built-in collaborators for `env`. A remote host client is only
    /// created when `fetch_remote` is set.
    pub fn for_env(env: &BuildEnv) -> Result<Self> {
        let host_client: Option<Box<dyn HostClient>> = if env.config.fetch_remote {
            Some(Box::new(HttpHostClient::new()?))
        } else {
            None
        };
        Ok(Self {
            schema: Box::new(DcCodec),
            model: Box::new(SceneCodec),
            dependencies: Box::new(CommandLister::for_family(env.family)),
            freezer_factory: Box::new(|env: &BuildEnv| -> Box<dyn Freezer> {
                Box::new(SourceFreezer::new(env.config.module_path.clone(), env.family))
            }),
            host_client,
        })
    }

    pub fn with_dependencies(mut self, dependencies: Box<dyn DependencyLister>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_freezer_factory(mut self, factory: FreezerFactory) -> Self {
        self.freezer_factory = factory;
        self
    }

    pub fn with_host_client(mut self, client: Option<Box<dyn HostClient>>) -> Self {
        self.host_client = client;
        self
    }
}

/// Summary of a package installed during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    pub name: String,
    pub kind: PackageKind,
    pub version: Option<String>,
    pub platform: Option<String>,
    /// Archive, or the copied file of a solo package
    pub path: PathBuf,
    /// Modules exported by the package
    pub modules: Vec<String>,
}

fn open<'a>(current: &'a mut Option<Package>, keyword: &str) -> Result<&'a mut Package> {
    current
        .as_mut()
        .ok_or_else(|| Error::OutsideOfPackage(keyword.to_string()))
}

/// `name` with its extension mapped to the family's native one
fn remap_source_name(family: HostFamily, name: &str) -> String {
    let ext = classifier::extension_of(name);
    match family.remap_extension(&ext) {
        Some(new_ext) => {
            let stem = &name[..name.len() - ext.len() - 1];
            if new_ext.is_empty() {
                stem.to_string()
            } else {
                format!("{}.{}", stem, new_ext)
            }
        }
        None => name.to_string(),
    }
}

fn dir_prefix(new_dir: Option<&str>) -> String {
    match new_dir.map(|d| d.trim_matches('/')) {
        Some(dir) if !dir.is_empty() => format!("{}/", dir),
        _ => String::new(),
    }
}

/// Drives one packaging run
pub struct Packager {
    env: BuildEnv,
    handlers: HandlerRegistry,
    dependencies: Box<dyn DependencyLister>,
    freezer_factory: FreezerFactory,
    resolver: RequirementResolver,
    contents: ContentsIndex,
    base_dir: PathBuf,
    current: Option<Package>,
    built: Vec<BuiltPackage>,
}

impl fmt::Debug for Packager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packager")
            .field("env", &self.env)
            .field("resolver", &self.resolver)
            .field("base_dir", &self.base_dir)
            .field("current", &self.current.as_ref().map(|p| &p.name))
            .field("built", &self.built)
            .finish_non_exhaustive()
    }
}

impl Packager {
    /// Start a run: load the contents index of the install dir
    pub fn new(env: BuildEnv, collaborators: Collaborators) -> Result<Self> {
        let mut contents = ContentsIndex::load(&env.config.install_dir)?;
        contents.set_descriptive_name(env.config.host_descriptive_name.clone());

        let handlers = HandlerRegistry::new(
            collaborators.schema,
            collaborators.model,
            ConfigTextProcessor::from_config(&env.config),
            env.config.schema_client_suffixes.clone(),
        );
        let resolver = RequirementResolver::from_env(&env).with_host_client(collaborators.host_client);

        info!(
            "Packaging into {} for {}",
            env.config.install_dir.display(),
            env.platform
        );
        Ok(Self {
            env,
            handlers,
            dependencies: collaborators.dependencies,
            freezer_factory: collaborators.freezer_factory,
            resolver,
            contents,
            base_dir: PathBuf::from("."),
            current: None,
            built: Vec::new(),
        })
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    /// Directory relative file names are resolved against
    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
    }

    pub fn current_package(&self) -> Option<&Package> {
        self.current.as_ref()
    }

    pub fn built(&self) -> &[BuiltPackage] {
        &self.built
    }

    pub fn contents(&self) -> &ContentsIndex {
        &self.contents
    }

    fn source_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn begin_package(&mut self, name: &str, kind: PackageKind) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(Error::PackageError(format!(
                "cannot begin {} {} inside {} {}",
                kind, name, open.kind, open.name
            )));
        }
        let freezer = (self.freezer_factory)(&self.env);
        let mut package = Package::new(name, kind, freezer, &self.env);
        if name == self.env.core_package() {
            package.version = Some(self.env.runtime_version().to_string());
        }
        debug!("Begin {} {}", kind, name);
        self.current = Some(package);
        Ok(())
    }

    /// Drop the open package without installing it
    pub fn abort_package(&mut self) {
        if let Some(mut package) = self.current.take() {
            warn!("Abandoning {} {}", package.kind, package.name);
            package.cleanup();
        }
    }

    pub fn config(&mut self, pairs: &[(String, String)]) -> Result<()> {
        let package = open(&mut self.current, "config")?;
        for (key, value) in pairs {
            package
                .configs
                .insert(key.clone(), normalize_config_value(value));
        }
        Ok(())
    }

    pub fn require(&mut self, names: &[String], version: Option<&str>, host: Option<&str>) -> Result<()> {
        let package = open(&mut self.current, "require")?;
        for name in names {
            require_into(&self.env, &mut self.resolver, package, name, version, host)?;
        }
        Ok(())
    }

    pub fn module(&mut self, names: &[String]) -> Result<()> {
        let package = open(&mut self.current, "module")?;
        for name in names {
            package.modules.freezer_mut().add_module(name, None, None, false);
        }
        Ok(())
    }

    pub fn rename_module(&mut self, module: &str, new_name: &str) -> Result<()> {
        let package = open(&mut self.current, "rename_module")?;
        package
            .modules
            .freezer_mut()
            .add_module(module, Some(new_name), None, false);
        Ok(())
    }

    pub fn exclude_module(&mut self, names: &[String], forbid: bool, allow_children: bool) -> Result<()> {
        let package = open(&mut self.current, "exclude_module")?;
        for name in names {
            package
                .modules
                .freezer_mut()
                .exclude_module(name, allow_children, forbid, ModuleOrigin::Declared);
        }
        Ok(())
    }

    pub fn main_module(&mut self, module: &str, new_name: Option<&str>, filename: Option<&str>) -> Result<()> {
        let source = filename.map(|f| self.source_path(f));
        let package = open(&mut self.current, "main_module")?;
        if let Some(existing) = &package.main_module {
            if existing.module != module {
                warn!(
                    "Replacing main_module {} with {} in {}",
                    existing.module, module, package.name
                );
            }
        }
        package.main_module = Some(MainModule {
            module: module.to_string(),
            new_name: new_name.unwrap_or(module).to_string(),
        });

        if let (Some(filename), Some(source)) = (filename, source) {
            let target = format!(
                "{}.{}",
                module.replace('.', "/"),
                classifier::extension_of(filename)
            );
            let spec = PackFileSpec::new(source)
                .with_target(target)
                .with_delete_temp(true)
                .with_overrides(FileOverrides::default().with_extract(Some(true)));
            package.add_file(spec, &self.env);
        }
        Ok(())
    }

    /// Freeze the modules collected so far into a standalone artifact and
    /// add it to the package
    pub fn freeze(&mut self, filename: &str, compile_to_exe: bool) -> Result<()> {
        let package = open(&mut self.current, "freeze")?;

        match (&package.main_module, compile_to_exe) {
            (Some(main), false) => {
                warn!("Ignoring main_module {} for freeze {}", main.module, filename);
            }
            (Some(main), true) => {
                let module = main.module.clone();
                package
                    .modules
                    .freezer_mut()
                    .add_module(&module, Some(MAIN_MODULE_NAME), None, false);
            }
            (None, true) => {
                return Err(Error::PackageError(format!(
                    "No main_module specified for executable {}",
                    filename
                )));
            }
            (None, false) => {}
        }

        package.modules.freezer_mut().done(compile_to_exe)?;
        let scratch = package.scratch_dir()?;
        let path = Path::new(filename);
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let artifact = package
            .modules
            .freezer_mut()
            .generate_code(&base, &scratch, compile_to_exe)?;

        let artifact_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(base);
        let dir = path.parent().map(platform::slash_path).unwrap_or_default();
        let target = if dir.is_empty() {
            artifact_name
        } else {
            format!("{}/{}", dir, artifact_name)
        };
        package.add_file(
            PackFileSpec::new(artifact)
                .with_target(target)
                .with_delete_temp(true)
                .with_overrides(FileOverrides::default().with_extract(Some(true))),
            &self.env,
        );

        package.add_extension_modules(&self.env);
        if package.platform.is_none() {
            package.platform = Some(self.env.platform.clone());
        }
        package.modules.freezer_mut().reset();
        package.main_module = None;
        Ok(())
    }

    /// Add files named by a `file` directive
    pub fn file(&mut self, directive: &FileDirective) -> Result<()> {
        if self.current.is_none() {
            return Err(Error::OutsideOfPackage("file".to_string()));
        }
        let single = directive.new_name.is_some() || directive.text.is_some();
        if single && directive.names.len() != 1 {
            return Err(Error::PackageError(
                "Cannot install multiple files with new_name or text".to_string(),
            ));
        }

        let mut files: Vec<(String, PathBuf, bool)> = Vec::new();
        let mut explicit = true;
        for name in &directive.names {
            let is_exe = classifier::extension_of(name) == "exe";
            let name = if directive.literal {
                name.clone()
            } else {
                remap_source_name(self.env.family, name)
            };
            let mut found = Vec::new();
            if !directive.literal && directive.text.is_none() {
                let pattern = if Path::new(&name).is_absolute() {
                    name.clone()
                } else {
                    format!(
                        "{}/{}",
                        glob::Pattern::escape(&self.base_dir.to_string_lossy()),
                        name
                    )
                };
                found = glob::glob(&pattern)?.filter_map(|p| p.ok()).collect();
            }
            match found.len() {
                0 => files.push((name.clone(), self.source_path(&name), is_exe)),
                1 => files.push((name.clone(), found.remove(0), is_exe)),
                _ => {
                    explicit = false;
                    found.sort();
                    files.extend(found.into_iter().map(|p| (name.clone(), p, is_exe)));
                }
            }
        }
        if single && files.len() != 1 {
            return Err(Error::PackageError(format!(
                "Cannot install multiple files with new_name or text: {}",
                directive.names.join(", ")
            )));
        }

        let prefix = dir_prefix(directive.new_dir.as_deref());
        let env = &self.env;
        let package = open(&mut self.current, "file")?;
        for (name, source, is_exe) in files {
            let base = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| classifier::basename(&name).to_string());
            let target = match (&directive.new_name, &directive.text) {
                (Some(new_name), _) => new_name.clone(),
                (None, Some(_)) => name.clone(),
                (None, None) => format!("{}{}", prefix, base),
            };
            let executable = directive.executable.or(is_exe.then_some(true));
            let spec = PackFileSpec::new(source)
                .with_target(target)
                .with_explicit(explicit)
                .with_text(directive.text.clone())
                .with_delete_temp(directive.delete_temp)
                .with_overrides(
                    FileOverrides::default()
                        .with_extract(directive.extract)
                        .with_executable(executable),
                );
            package.add_file(spec, env);
        }
        Ok(())
    }

    /// Add the known-type files under a directory, recursively
    pub fn dir(&mut self, dirname: &str, new_dir: Option<&str>, unprocessed: Option<bool>) -> Result<()> {
        let root = self.source_path(dirname);
        let env = &self.env;
        let package = open(&mut self.current, "dir")?;
        if !root.is_dir() {
            warn!("No such directory: {}", root.display());
            return Ok(());
        }

        let prefix = dir_prefix(new_dir);
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| Error::IoError(format!("cannot walk {}: {}", root.display(), e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let target = format!("{}{}", prefix, platform::slash_path(relative));
            let (stored, _) = classifier::strip_pz(&target);
            let ext = classifier::extension_of(&stored);
            if ext != classifier::SOURCE_EXTENSION && !env.classifier.table().is_known(&ext) {
                continue;
            }
            let spec = PackFileSpec::implicit(entry.path())
                .with_target(target)
                .with_overrides(FileOverrides::default().with_unprocessed(unprocessed));
            package.add_file(spec, env);
        }
        Ok(())
    }

    pub fn exclude(&mut self, pattern: &str) -> Result<()> {
        let package = open(&mut self.current, "exclude")?;
        package.exclude_file(pattern, &self.env)
    }

    /// Close the open package and install it
    pub fn end_package(&mut self) -> Result<Option<BuiltPackage>> {
        let mut package = self
            .current
            .take()
            .ok_or_else(|| Error::OutsideOfPackage("end_package".to_string()))?;
        match self.close(&mut package) {
            Ok(built) => {
                if let Some(built) = &built {
                    self.built.push(built.clone());
                }
                Ok(built)
            }
            Err(e) => {
                package.cleanup();
                Err(e)
            }
        }
    }

    fn close(&mut self, package: &mut Package) -> Result<Option<BuiltPackage>> {
        package.take_platform_override();
        if let Some(version) = package.configs.remove("version") {
            package.version = Some(version);
        }

        let core = self.env.core_package().to_string();
        if package.name == core {
            if package.version.as_deref() != Some(self.env.runtime_version()) {
                return Err(Error::RuntimeMismatch(format!(
                    "cannot build {} version {} with runtime version {}",
                    core,
                    package.version.as_deref().unwrap_or("(none)"),
                    self.env.runtime_version()
                )));
            }
            if package.host.as_deref() != Some(self.env.runtime_host()) {
                return Err(Error::RuntimeMismatch(format!(
                    "cannot build {} for host {} with runtime host {}",
                    core,
                    package.host.as_deref().unwrap_or("(none)"),
                    self.env.runtime_host()
                )));
            }
        }

        if package.is_application() {
            package.compression_level = crate::package::assembler::COMPRESSED_ARCHIVE_LEVEL;
            if !package.requires.iter().any(|r| r.name == core) {
                require_into(&self.env, &mut self.resolver, package, &core, None, None)?;
            }
        } else if package.version.is_none() {
            package.version = package.required_core_version(&core).map(str::to_string);
        }

        if package.kind == PackageKind::Solo {
            let Some(entry) = install_solo(&self.env, package)? else {
                return Ok(None);
            };
            let built = BuiltPackage {
                name: package.name.clone(),
                kind: package.kind,
                version: package.version.clone(),
                platform: package.platform.clone(),
                path: self.env.config.install_dir.join(&entry.file.filename),
                modules: Vec::new(),
            };
            self.contents.insert(entry);
            return Ok(Some(built));
        }

        let installed = ContentAssembler::new(&self.env, &self.handlers, self.dependencies.as_ref())
            .install_multifile(package)?;

        if !package.is_application() {
            self.resolver.register_built(Rc::new(RequiredPackage {
                name: package.name.clone(),
                platform: package.platform.clone(),
                version: package.version.clone(),
                host: package.host.clone(),
                requires: package.requires.clone(),
                filenames: installed.components.iter().map(|c| c.filename.clone()).collect(),
                modules: package.modules.exported_map(),
                import_descriptor: Some(installed.layout.import_descriptor.clone()),
            }));
        }
        if let Some(entry) = installed.entry {
            self.contents.insert(entry);
        }

        Ok(Some(BuiltPackage {
            name: package.name.clone(),
            kind: package.kind,
            version: package.version.clone(),
            platform: package.platform.clone(),
            path: installed.layout.archive.clone(),
            modules: installed.exported_modules.iter().map(|m| m.name.clone()).collect(),
        }))
    }

    /// End the run: fail on an unclosed package and write the contents
    /// index if anything changed
    pub fn finish(mut self) -> Result<Vec<BuiltPackage>> {
        if let Some(package) = &self.current {
            let name = package.name.clone();
            self.abort_package();
            return Err(Error::PackageError(format!("package {} was never closed", name)));
        }
        if self.contents.save()? {
            info!("Updated {}", self.contents.path().display());
        }
        Ok(self.built)
    }
}

/// Resolve one requirement and add it to `package`. Requirements on the
/// core runtime are pinned to the active runtime.
fn require_into(
    env: &BuildEnv,
    resolver: &mut RequirementResolver,
    package: &mut Package,
    name: &str,
    version: Option<&str>,
    host: Option<&str>,
) -> Result<()> {
    let (version, host) = if name == env.core_package() {
        if let Some(v) = version.filter(|v| *v != env.runtime_version()) {
            return Err(Error::RuntimeMismatch(format!(
                "cannot require {} version {}, runtime is version {}",
                name,
                v,
                env.runtime_version()
            )));
        }
        if let Some(h) = host.filter(|h| *h != env.runtime_host()) {
            return Err(Error::RuntimeMismatch(format!(
                "cannot require {} from host {}, runtime is from {}",
                name,
                h,
                env.runtime_host()
            )));
        }
        (Some(env.runtime_version()), Some(env.runtime_host()))
    } else {
        (version, host)
    };

    let found = resolver.resolve(name, Some(&env.platform), version, host, &package.requires)?;
    let Some(required) = found else {
        return Err(Error::UnknownPackage {
            name: name.to_string(),
            version: version.unwrap_or_default().to_string(),
        });
    };
    debug!("{} requires {}", package.name, required.key());
    package.require_package(&required);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackagerConfig;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct NoDependencies;

    impl DependencyLister for NoDependencies {
        fn list_dependencies(&self, _file: &Path) -> Option<Vec<String>> {
            Some(Vec::new())
        }
    }

    fn packager(root: &Path) -> Packager {
        let mut config = PackagerConfig::new(root.join("out"), "1.0", "https://h");
        config.platform = Some("linux_amd64".to_string());
        let env = BuildEnv::new(config).unwrap();
        let collaborators = Collaborators::for_env(&env)
            .unwrap()
            .with_dependencies(Box::new(NoDependencies));
        let mut packager = Packager::new(env, collaborators).unwrap();
        packager.set_base_dir(root);
        packager
    }

    #[test]
    fn test_remap_source_name() {
        assert_eq!(remap_source_name(HostFamily::Posix, "libfoo.dll"), "libfoo.so");
        assert_eq!(remap_source_name(HostFamily::MacOs, "ext.pyd"), "ext.dylib");
        assert_eq!(remap_source_name(HostFamily::Posix, "tool.exe"), "tool");
        assert_eq!(remap_source_name(HostFamily::Windows, "tool.exe"), "tool.exe");
        assert_eq!(remap_source_name(HostFamily::Posix, "readme.txt"), "readme.txt");
    }

    #[test]
    fn test_directives_outside_package() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        assert!(matches!(
            packager.config(&[("a".to_string(), "b".to_string())]),
            Err(Error::OutsideOfPackage(_))
        ));
        assert!(matches!(packager.end_package(), Err(Error::OutsideOfPackage(_))));
    }

    #[test]
    fn test_nested_package_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("a", PackageKind::Library).unwrap();
        assert!(packager.begin_package("b", PackageKind::Library).is_err());
    }

    #[test]
    fn test_glob_with_many_matches_is_implicit() {
        let temp = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt"] {
            fs::write(temp.path().join(name), name).unwrap();
        }
        fs::write(temp.path().join("only.txt"), "x").unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("docs", PackageKind::Library).unwrap();
        packager
            .file(&FileDirective {
                names: vec!["[ab].txt".to_string()],
                new_dir: Some("docs".to_string()),
                ..FileDirective::default()
            })
            .unwrap();
        packager
            .file(&FileDirective {
                names: vec!["only.txt".to_string()],
                new_name: Some("renamed.txt".to_string()),
                ..FileDirective::default()
            })
            .unwrap();

        let files = packager.current_package().unwrap().files();
        let summary: Vec<_> = files.iter().map(|f| (f.target.as_str(), f.explicit)).collect();
        assert_eq!(
            summary,
            vec![("docs/a.txt", false), ("docs/b.txt", false), ("renamed.txt", true)]
        );
    }

    #[test]
    fn test_new_name_needs_single_file() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("docs", PackageKind::Library).unwrap();
        let err = packager
            .file(&FileDirective {
                names: vec!["a.txt".to_string(), "b.txt".to_string()],
                new_name: Some("c.txt".to_string()),
                ..FileDirective::default()
            })
            .unwrap_err();
        assert!(err.is_fatal_for_package());
    }

    #[test]
    fn test_text_file_targets_given_name() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("docs", PackageKind::Library).unwrap();
        packager
            .file(&FileDirective {
                names: vec!["notes/hello.txt".to_string()],
                text: Some("hello".to_string()),
                ..FileDirective::default()
            })
            .unwrap();
        let file = &packager.current_package().unwrap().files()[0];
        assert_eq!(file.target, "notes/hello.txt");
        assert_eq!(file.read_contents().unwrap(), b"hello");
    }

    #[test]
    fn test_main_module_file_is_temporary() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("launch.py"), "run()\n").unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("game", PackageKind::Application).unwrap();
        packager
            .main_module("game.start", None, Some("launch.py"))
            .unwrap();

        let package = packager.current_package().unwrap();
        let file = &package.files()[0];
        assert_eq!(file.target, "game/start.py");
        assert!(file.explicit);
        assert!(file.delete_temp);
        assert_eq!(package.main_module.as_ref().unwrap().new_name, "game.start");
    }

    #[test]
    fn test_dir_adds_known_types_only() {
        let temp = TempDir::new().unwrap();
        let assets = temp.path().join("assets");
        fs::create_dir_all(assets.join("sub")).unwrap();
        fs::create_dir_all(assets.join(".svn")).unwrap();
        fs::write(assets.join("notes.txt"), "n").unwrap();
        fs::write(assets.join("sub/logic.py"), "x = 1\n").unwrap();
        fs::write(assets.join("data.unknown"), "?").unwrap();
        fs::write(assets.join(".svn/entries.txt"), "svn").unwrap();

        let mut packager = packager(temp.path());
        packager.begin_package("assets", PackageKind::Library).unwrap();
        packager.dir("assets", Some("res"), None).unwrap();

        let targets: Vec<_> = packager
            .current_package()
            .unwrap()
            .files()
            .iter()
            .map(|f| (f.target.clone(), f.explicit))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("res/notes.txt".to_string(), false),
                ("res/sub/logic.py".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_freeze_executable_needs_main_module() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("tools", PackageKind::Library).unwrap();
        let err = packager.freeze("bin/tool", true).unwrap_err();
        assert!(matches!(err, Error::PackageError(_)));
    }

    #[test]
    fn test_core_requirement_is_pinned() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("game", PackageKind::Library).unwrap();
        let err = packager
            .require(&["core".to_string()], Some("2.0"), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuntimeMismatch(_)));
    }

    #[test]
    fn test_config_booleans_are_normalized() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        packager.begin_package("game", PackageKind::Library).unwrap();
        packager
            .config(&[
                ("fullscreen".to_string(), "true".to_string()),
                ("title".to_string(), "Game".to_string()),
            ])
            .unwrap();
        let configs = &packager.current_package().unwrap().configs;
        assert_eq!(configs["fullscreen"], "1");
        assert_eq!(configs["title"], "Game");
    }
}
