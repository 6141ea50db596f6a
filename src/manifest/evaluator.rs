// src/manifest/evaluator.rs

//! Runs manifest statements against a [`Packager`]

use crate::error::Result;
use crate::manifest::directive::{Directive, Statement};
use crate::manifest::parser::read_manifest;
use crate::packager::Packager;
use std::path::Path;
use tracing::debug;

/// Dispatches statements in order. Any failure abandons the open package
/// and is returned with the statement's location attached.
#[derive(Debug)]
pub struct ManifestEvaluator<'p> {
    packager: &'p mut Packager,
    file: String,
}

impl<'p> ManifestEvaluator<'p> {
    pub fn new(packager: &'p mut Packager, file: impl Into<String>) -> Self {
        Self {
            packager,
            file: file.into(),
        }
    }

    pub fn run(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            debug!("{}:{}: {}", self.file, statement.line, statement.directive);
            if let Err(e) = self.dispatch(&statement.directive) {
                self.packager.abort_package();
                return Err(e.at(self.file.clone(), statement.line));
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, directive: &Directive) -> Result<()> {
        let packager = &mut *self.packager;
        match directive {
            Directive::BeginPackage { name, kind } => packager.begin_package(name, *kind),
            Directive::EndPackage => packager.end_package().map(|_| ()),
            Directive::Config(pairs) => packager.config(pairs),
            Directive::Require {
                names,
                version,
                host,
            } => packager.require(names, version.as_deref(), host.as_deref()),
            Directive::Module { names } => packager.module(names),
            Directive::RenameModule { module, new_name } => packager.rename_module(module, new_name),
            Directive::ExcludeModule {
                names,
                forbid,
                allow_children,
            } => packager.exclude_module(names, *forbid, *allow_children),
            Directive::MainModule {
                module,
                new_name,
                filename,
            } => packager.main_module(module, new_name.as_deref(), filename.as_deref()),
            Directive::Freeze {
                filename,
                compile_to_exe,
            } => packager.freeze(filename, *compile_to_exe),
            Directive::File(file) => packager.file(file),
            Directive::Exclude { pattern } => packager.exclude(pattern),
            Directive::Dir {
                dirname,
                new_dir,
                unprocessed,
            } => packager.dir(dirname, new_dir.as_deref(), *unprocessed),
        }
    }
}

/// Parse a manifest file and run it. Relative file names in the manifest
/// are resolved against its directory.
pub fn evaluate_file(packager: &mut Packager, path: &Path) -> Result<()> {
    let statements = read_manifest(path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        packager.set_base_dir(dir);
    }
    ManifestEvaluator::new(packager, path.display().to_string()).run(&statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackagerConfig;
    use crate::deps::DependencyLister;
    use crate::env::BuildEnv;
    use crate::error::Error;
    use crate::manifest::parse_manifest;
    use crate::packager::Collaborators;
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
        Packager::new(env, collaborators).unwrap()
    }

    #[test]
    fn test_error_carries_location_and_abandons_package() {
        let temp = TempDir::new().unwrap();
        let mut packager = packager(temp.path());
        let statements = parse_manifest(
            "[[package]]\nname = \"game\"\nsteps = [\n  { require = \"nowhere\" },\n]\n",
        )
        .unwrap();

        let err = ManifestEvaluator::new(&mut packager, "game.toml")
            .run(&statements)
            .unwrap_err();
        match err {
            Error::Located { file, line, source } => {
                assert_eq!(file, "game.toml");
                assert_eq!(line, 4);
                assert!(matches!(*source, Error::UnknownPackage { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(packager.current_package().is_none());
    }

    #[test]
    fn test_evaluate_file_builds_library() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("readme.txt"), "read me").unwrap();
        let manifest = src.join("docs.toml");
        fs::write(
            &manifest,
            "[[package]]\nname = \"docs\"\nsteps = [\n  { file = \"readme.txt\" },\n]\n",
        )
        .unwrap();

        let mut packager = packager(temp.path());
        evaluate_file(&mut packager, &manifest).unwrap();
        let built = packager.finish().unwrap();
        assert_eq!(built.len(), 1);
        assert!(built[0].path.ends_with("docs/docs.mf"));
        assert!(built[0].path.exists());
    }
}
