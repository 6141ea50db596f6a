// src/package/assembler.rs

//! Multifile assembly
//!
//! [`ContentAssembler::install_multifile`] closes a package in a fixed
//! order:
//!
//! 1. schema files are scanned for implicit module imports
//! 2. source files are registered as modules, then the main module
//! 3. the freezer finalizes and its blob and native extras are added
//! 4. the shared library closure is computed
//! 5. remaining files are written as components
//! 6. models are written last, importing any textures not yet present
//! 7. platform, output paths, `.base` preservation, the move into place,
//!    the `.pz` sibling and the descriptor documents

use crate::archive::{Archive, Multifile, compression};
use crate::contents::PackageEntry;
use crate::deps::{DependencyLister, DependencyScanner};
use crate::descriptor::lineage::{ArchiveFiles, DescriptorFields};
use crate::descriptor::{
    self, APP_MANIFEST_ENTRY, AppManifest, ComponentRecord, FileSpec, ImportDescriptor,
    ModuleRecord, PackageDescriptor, PatchLineageTracker, RequirementRecord,
};
use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::files::PackFile;
use crate::modules::freezer::RUNTIME_HEADER;
use crate::package::handlers::{HandlerRegistry, Phase};
use crate::package::layout::PackageLayout;
use crate::package::{Package, PackageState};
use crate::platform;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Gzip level of the downloadable `.pz` sibling
pub const COMPRESSED_ARCHIVE_LEVEL: u32 = 6;

/// Mutable state shared by the handlers while one package is written
pub struct AssemblyContext<'a> {
    pub env: &'a BuildEnv,
    pub package: &'a mut Package,
    pub archive: &'a mut dyn Archive,
    pub components: Vec<ComponentRecord>,
    pub extracts: Vec<FileSpec>,
    imported_textures: HashMap<PathBuf, String>,
}

impl<'a> AssemblyContext<'a> {
    pub fn new(env: &'a BuildEnv, package: &'a mut Package, archive: &'a mut dyn Archive) -> Self {
        Self {
            env,
            package,
            archive,
            components: Vec::new(),
            extracts: Vec::new(),
            imported_textures: HashMap::new(),
        }
    }

    fn level_for(&self, compress: bool) -> u32 {
        if compress {
            self.package.compression_level
        } else {
            0
        }
    }

    /// Store a file's raw content under its target
    pub fn add_component(&mut self, file: &PackFile) -> Result<()> {
        let data = file.read_contents()?;
        self.add_component_bytes(
            &file.target,
            data,
            file.flags.compress,
            file.flags.extract,
            file.timestamp(),
        )
    }

    /// Store content under `target`. Entries already in the archive are
    /// left alone.
    pub fn add_component_bytes(
        &mut self,
        target: &str,
        data: Vec<u8>,
        compress: bool,
        extract: bool,
        timestamp: u64,
    ) -> Result<()> {
        let spec = extract.then(|| FileSpec::from_bytes(target, &data, timestamp));
        let level = self.level_for(compress);
        if !self.archive.add_entry(target, data, level)? {
            return Ok(());
        }

        self.components.push(ComponentRecord {
            filename: target.to_string(),
        });
        if let Some(spec) = spec {
            self.extracts.push(spec);
        }
        Ok(())
    }

    /// Archive path of a texture file a model refers to. Textures already
    /// in the package keep their target; others are imported uncompressed
    /// under the imported-maps directory.
    pub fn add_found_texture(&mut self, source: &Path) -> Result<String> {
        let source = platform::canonical_path(source);
        if let Some(file) = self.package.file_by_source(&source) {
            return Ok(file.target.clone());
        }
        if let Some(target) = self.imported_textures.get(&source) {
            return Ok(target.clone());
        }

        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = &self.env.config.imported_maps_dir;
        let (stem, ext) = match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
            _ => (base.clone(), None),
        };

        let mut target = format!("{}/{}", dir, base);
        let mut n = 1;
        while self.archive.find_entry(&target).is_some() || self.package.has_target(&target) {
            target = match &ext {
                Some(ext) => format!("{}/{}_{}.{}", dir, stem, n, ext),
                None => format!("{}/{}_{}", dir, stem, n),
            };
            n += 1;
        }

        let data = fs::read(&source)
            .map_err(|e| Error::IoError(format!("cannot read texture {}: {}", source.display(), e)))?;
        let timestamp = crate::files::pack_file::file_timestamp(&source);
        self.add_component_bytes(&target, data, false, false, timestamp)?;
        debug!("Imported texture {} as {}", source.display(), target);
        self.imported_textures.insert(source, target.clone());
        Ok(target)
    }
}

/// What an installed multifile package produced
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub layout: PackageLayout,
    pub descriptor: PackageDescriptor,
    /// Absent for applications
    pub import_descriptor: Option<ImportDescriptor>,
    pub components: Vec<ComponentRecord>,
    pub exported_modules: Vec<ModuleRecord>,
    /// Contents index record; absent for applications
    pub entry: Option<PackageEntry>,
}

/// Drives the write passes of a multifile package
#[derive(Debug)]
pub struct ContentAssembler<'a> {
    env: &'a BuildEnv,
    handlers: &'a HandlerRegistry,
    dependencies: &'a dyn DependencyLister,
}

impl<'a> ContentAssembler<'a> {
    pub fn new(env: &'a BuildEnv, handlers: &'a HandlerRegistry, dependencies: &'a dyn DependencyLister) -> Self {
        Self {
            env,
            handlers,
            dependencies,
        }
    }

    /// Close `package` and install it as a multifile
    pub fn install_multifile(&self, package: &mut Package) -> Result<InstalledPackage> {
        package.begin_close()?;
        let application = package.is_application();

        let scratch = package.scratch_dir()?;
        let temp_archive = scratch.join(format!("{}.partial", package.name));
        let mut archive = Multifile::create(&temp_archive);
        if application {
            archive.set_header_prefix(RUNTIME_HEADER);
        }

        let (components, extracts) = self.write_contents(package, &mut archive)?;
        package.consider_platform(self.env);

        let layout = PackageLayout::multifile(
            &self.env.config.install_dir,
            &package.name,
            package.version.as_deref(),
            package.platform.as_deref(),
            application,
        );

        if application {
            let manifest = app_manifest(package)?;
            archive.add_entry(APP_MANIFEST_ENTRY, descriptor::to_toml(&manifest)?.into_bytes(), 0)?;
        }
        archive.repack()?;
        archive.close()?;
        package.set_state(PackageState::MultifileWritten);

        let base = layout.base_archive();
        if !application && !base.exists() && layout.archive.exists() {
            info!("Preserving {} as {}", layout.archive.display(), base.display());
            fs::rename(&layout.archive, &base).map_err(|e| {
                Error::PackageError(format!("cannot preserve {}: {}", layout.archive.display(), e))
            })?;
        }
        move_into_place(&temp_archive, &layout.archive)?;
        if application {
            mark_executable(&layout.archive)?;
        }

        let compressed = layout.compressed_archive();
        compression::compress_file(&layout.archive, &compressed, COMPRESSED_ARCHIVE_LEVEL)?;

        let exported_modules = package.modules.exported().to_vec();
        let with_platform = package.platform.is_some();
        let requires: Vec<RequirementRecord> = package
            .requires
            .iter()
            .map(|r| r.requirement_record(with_platform))
            .collect();

        let tracker = PatchLineageTracker::new(&self.env.config.install_dir);
        let lineage = tracker.read_prior_descriptor(&layout.descriptor);
        let fields = DescriptorFields {
            name: &package.name,
            platform: package.platform.as_deref(),
            version: package.version.as_deref(),
            host: package.host.as_deref(),
            config: &package.configs,
            requires: requires.clone(),
        };
        let archives = ArchiveFiles {
            uncompressed: &layout.archive,
            compressed: Some(&compressed),
            base: (!application).then_some(base.as_path()),
        };
        let written = tracker.write_descriptor(&layout.descriptor, &fields, &lineage, &archives, extracts)?;

        let mut import_descriptor = None;
        let mut entry = None;
        if !application {
            let document = tracker.write_import_descriptor(
                &layout.import_descriptor,
                ImportDescriptor {
                    name: package.name.clone(),
                    platform: package.platform.clone(),
                    version: package.version.clone(),
                    host: package.host.clone(),
                    requires,
                    components: components.clone(),
                    modules: exported_modules.clone(),
                },
            )?;
            entry = Some(PackageEntry {
                name: package.name.clone(),
                platform: package.platform.clone(),
                version: package.version.clone(),
                solo: false,
                file: FileSpec::from_file(&layout.descriptor, tracker.relative_name(&layout.descriptor))?,
                import_file: Some(FileSpec::from_file(
                    &layout.import_descriptor,
                    tracker.relative_name(&layout.import_descriptor),
                )?),
            });
            import_descriptor = Some(document);
        }
        package.set_state(PackageState::DescriptorsWritten);

        info!(
            "Installed {} {} ({} components)",
            package.kind,
            layout.archive.display(),
            components.len()
        );
        package.cleanup();

        Ok(InstalledPackage {
            layout,
            descriptor: written,
            import_descriptor,
            components,
            exported_modules,
            entry,
        })
    }

    /// Run the module, component and model passes
    fn write_contents(
        &self,
        package: &mut Package,
        archive: &mut dyn Archive,
    ) -> Result<(Vec<ComponentRecord>, Vec<FileSpec>)> {
        self.register_modules(package)?;
        self.freeze(package, archive)?;

        let added = DependencyScanner::new(self.env, self.dependencies).scan(package);
        if added > 0 {
            debug!("{}: added {} shared libraries", package.name, added);
        }

        let mut ctx = AssemblyContext::new(self.env, package, archive);
        self.run_phase(&mut ctx, Phase::Components)?;
        self.run_phase(&mut ctx, Phase::Models)?;
        Ok((ctx.components, ctx.extracts))
    }

    fn register_modules(&self, package: &mut Package) -> Result<()> {
        let files: Vec<PackFile> = package
            .files()
            .iter()
            .filter(|f| !package.is_excluded(f, self.env))
            .cloned()
            .collect();
        for file in &files {
            self.handlers.handler_for(file).scan(file, package)?;
        }

        for file in &files {
            let handler = self.handlers.handler_for(file);
            if handler.phase() == Phase::Modules {
                let mut archive = NullArchive;
                let mut ctx = AssemblyContext::new(self.env, package, &mut archive);
                handler.contribute(file, &mut ctx)?;
            }
        }

        if package.is_application() && package.main_module.is_none() {
            return Err(Error::PackageError(format!(
                "No main_module specified for application {}",
                package.name
            )));
        }
        if let Some(main) = package.main_module.clone() {
            let freezer = package.modules.freezer_mut();
            if !freezer.has_module(&main.new_name) {
                freezer.add_module(&main.module, Some(&main.new_name), None, false);
            }
        }
        Ok(())
    }

    fn freeze(&self, package: &mut Package, archive: &mut dyn Archive) -> Result<()> {
        package.modules.apply_skips();
        package.modules.freezer_mut().done(false)?;

        let level = package.compression_level;
        for (name, data) in package.modules.freezer().archive_entries()? {
            archive.add_entry(&name, data, level)?;
        }
        package.add_extension_modules(self.env);
        package.modules.build_export_table();
        Ok(())
    }

    /// Walk the live file list; handlers may grow it
    fn run_phase(&self, ctx: &mut AssemblyContext<'_>, phase: Phase) -> Result<()> {
        let mut index = 0;
        while index < ctx.package.files().len() {
            let file = ctx.package.files()[index].clone();
            index += 1;
            if ctx.package.is_excluded(&file, self.env) {
                continue;
            }
            let handler = self.handlers.handler_for(&file);
            if handler.phase() == phase {
                handler.contribute(&file, ctx)?;
            }
        }
        Ok(())
    }
}

/// Sink for the module pass, which never writes entries
struct NullArchive;

impl Archive for NullArchive {
    fn add_entry(&mut self, name: &str, _data: Vec<u8>, _level: u32) -> Result<bool> {
        Err(Error::PackageError(format!(
            "{} cannot be written during module registration",
            name
        )))
    }

    fn find_entry(&self, _name: &str) -> Option<usize> {
        None
    }

    fn entry_count(&self) -> usize {
        0
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn repack(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn app_manifest(package: &Package) -> Result<AppManifest> {
    let main = package.main_module.as_ref().ok_or_else(|| {
        Error::PackageError(format!("No main_module specified for application {}", package.name))
    })?;
    let with_platform = package.platform.is_some();
    Ok(AppManifest {
        name: package.name.clone(),
        platform: package.platform.clone(),
        version: package.version.clone(),
        main_module: main.new_name.clone(),
        config: package.configs.clone(),
        requires: package
            .requires
            .iter()
            .map(|r| r.requirement_record(with_platform))
            .collect(),
    })
}

/// Move the finished archive to its install path, copying across devices
fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.exists() {
        fs::remove_file(to)
            .map_err(|e| Error::PackageError(format!("cannot replace {}: {}", to.display(), e)))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| {
        Error::PackageError(format!(
            "Couldn't move {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    if let Err(e) = fs::remove_file(from) {
        warn!("Could not remove {}: {}", from.display(), e);
    }
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::PackageError(format!("cannot chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ConfigTextProcessor, DcCodec, SceneCodec};
    use crate::config::PackagerConfig;
    use crate::files::PackFileSpec;
    use crate::modules::SourceFreezer;
    use crate::package::{MainModule, PackageKind};
    use tempfile::TempDir;

    #[derive(Debug)]
    struct NoDependencies;

    impl DependencyLister for NoDependencies {
        fn list_dependencies(&self, _file: &Path) -> Option<Vec<String>> {
            Some(Vec::new())
        }
    }

    fn env(root: &Path) -> BuildEnv {
        let mut config = PackagerConfig::new(root.join("out"), "1.0", "https://h");
        config.platform = Some("linux_amd64".to_string());
        config.module_path = vec![root.join("src")];
        BuildEnv::new(config).unwrap()
    }

    fn handlers() -> HandlerRegistry {
        HandlerRegistry::new(
            Box::new(DcCodec),
            Box::new(SceneCodec),
            ConfigTextProcessor::default(),
            vec!["OV".to_string()],
        )
    }

    fn package(env: &BuildEnv, name: &str, kind: PackageKind) -> Package {
        let freezer = SourceFreezer::new(env.config.module_path.clone(), env.family);
        Package::new(name, kind, Box::new(freezer), env)
    }

    #[test]
    fn test_application_without_main_module_is_fatal() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let handlers = handlers();
        let mut pkg = package(&env, "app", PackageKind::Application);
        let err = ContentAssembler::new(&env, &handlers, &NoDependencies)
            .install_multifile(&mut pkg)
            .unwrap_err();
        assert!(err.is_fatal_for_package());
    }

    #[test]
    fn test_library_install_writes_documents() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("maps")).unwrap();
        fs::write(src.join("readme.txt"), "hello").unwrap();
        fs::write(src.join("settings.prc"), "# comment\nwindow-title Game\n\n").unwrap();
        fs::write(src.join("maps/wood.png"), b"png").unwrap();
        fs::write(
            src.join("crate.egg"),
            "[[texture]]\nname = \"wood\"\nfilename = \"maps/wood.png\"\n",
        )
        .unwrap();

        let handlers = handlers();
        let mut pkg = package(&env, "assets", PackageKind::Library);
        pkg.version = Some("2.0".to_string());
        for name in ["readme.txt", "settings.prc", "crate.egg"] {
            pkg.add_file(PackFileSpec::new(src.join(name)).with_target(name), &env);
        }

        let installed = ContentAssembler::new(&env, &handlers, &NoDependencies)
            .install_multifile(&mut pkg)
            .unwrap();

        let out = temp.path().join("out/assets/2.0");
        assert_eq!(installed.layout.archive, out.join("assets.2.0.mf"));
        assert!(out.join("assets.2.0.mf.pz").exists());
        assert!(out.join("assets.2.0.import.toml").exists());
        assert_eq!(pkg.state(), PackageState::Done);

        let names: Vec<_> = installed.components.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["readme.txt", "settings.prc", "imported_maps/wood.png", "crate.bam"]
        );

        let archive = Multifile::open_read(&installed.layout.archive).unwrap();
        assert_eq!(
            archive.read_entry("settings.prc").unwrap().unwrap(),
            b"window-title Game\n"
        );
        let scene = SceneCodec
            .decode(&archive.read_entry("crate.bam").unwrap().unwrap())
            .unwrap();
        assert_eq!(
            scene.textures[0].filename.as_deref(),
            Some("imported_maps/wood.png")
        );
        assert!(installed.entry.is_some());
        assert!(installed.descriptor.compressed_archive.is_some());
    }

    #[test]
    fn test_texture_names_avoid_collisions() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("wood.png"), b"one").unwrap();
        fs::write(b.join("wood.png"), b"two").unwrap();

        let mut pkg = package(&env, "assets", PackageKind::Library);
        let mut archive = Multifile::create(temp.path().join("scratch.mf"));
        let mut ctx = AssemblyContext::new(&env, &mut pkg, &mut archive);
        assert_eq!(ctx.add_found_texture(&a.join("wood.png")).unwrap(), "imported_maps/wood.png");
        assert_eq!(ctx.add_found_texture(&b.join("wood.png")).unwrap(), "imported_maps/wood_1.png");
        assert_eq!(ctx.add_found_texture(&a.join("wood.png")).unwrap(), "imported_maps/wood.png");
        assert_eq!(ctx.components.len(), 2);
    }

    #[test]
    fn test_application_archive() {
        let temp = TempDir::new().unwrap();
        let env = env(temp.path());
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.py"), "print('hi')\n").unwrap();

        let handlers = handlers();
        let mut pkg = package(&env, "app1", PackageKind::Application);
        pkg.compression_level = 6;
        pkg.add_file(PackFileSpec::new(src.join("main.py")).with_target("main.py"), &env);
        pkg.main_module = Some(MainModule {
            module: "main".to_string(),
            new_name: "main".to_string(),
        });

        let installed = ContentAssembler::new(&env, &handlers, &NoDependencies)
            .install_multifile(&mut pkg)
            .unwrap();
        assert_eq!(installed.layout.archive, temp.path().join("out/app1.p3d"));
        assert!(installed.entry.is_none());
        assert!(installed.import_descriptor.is_none());
        assert!(!temp.path().join("out/app1.p3d.base").exists());

        let archive = Multifile::open_read(&installed.layout.archive).unwrap();
        assert_eq!(archive.header_prefix(), Some(RUNTIME_HEADER));
        assert_eq!(archive.is_compressed(APP_MANIFEST_ENTRY), Some(false));
        assert!(archive
            .entry_names()
            .contains(&crate::modules::FROZEN_MODULES_ENTRY));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed.layout.archive).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
