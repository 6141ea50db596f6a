// src/package/solo.rs

//! Solo packages: one file copied straight into the install tree

use crate::contents::PackageEntry;
use crate::descriptor::{FileSpec, PatchLineageTracker};
use crate::env::BuildEnv;
use crate::error::{Error, Result};
use crate::files::PackFile;
use crate::package::layout::solo_dir;
use crate::package::{Package, PackageState};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Remove files left in `dir` by an earlier build
fn remove_stale_files(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)
                .map_err(|e| Error::IoError(format!("cannot remove {}: {}", path.display(), e)))?;
        }
    }
    Ok(())
}

/// Install a solo package. Returns its contents index record, or `None`
/// when nothing was installed.
pub fn install_solo(env: &BuildEnv, package: &mut Package) -> Result<Option<PackageEntry>> {
    package.begin_close()?;
    package.consider_platform(env);

    let dir = solo_dir(
        &env.config.install_dir,
        &package.name,
        package.platform.as_deref(),
        package.version.as_deref(),
    );
    remove_stale_files(&dir)?;

    let files: Vec<PackFile> = package
        .files()
        .iter()
        .filter(|f| !package.is_excluded(f, env))
        .cloned()
        .collect();

    let file = match files.as_slice() {
        [file] => file,
        [] if !package.missing().is_empty() => {
            return Err(Error::PackageError(format!(
                "No files for solo package {}: {} not found",
                package.name,
                package.missing()[0].display()
            )));
        }
        [] => {
            warn!("Solo package {} has no files", package.name);
            package.cleanup();
            return Ok(None);
        }
        _ => {
            return Err(Error::PackageError(format!(
                "Multiple files in solo package {}",
                package.name
            )));
        }
    };

    let dest = dir.join(file.basename());
    let copied = fs::create_dir_all(&dir)
        .map_err(Error::from)
        .and_then(|_| file.read_contents())
        .and_then(|data| fs::write(&dest, data).map_err(Error::from));
    if let Err(e) = copied {
        warn!("Unable to copy {} to {}: {}", file.source.display(), dest.display(), e);
        package.cleanup();
        return Ok(None);
    }
    package.set_state(PackageState::MultifileWritten);

    let tracker = PatchLineageTracker::new(&env.config.install_dir);
    let entry = PackageEntry {
        name: package.name.clone(),
        platform: package.platform.clone(),
        version: package.version.clone(),
        solo: true,
        file: FileSpec::from_file(&dest, tracker.relative_name(&dest))?,
        import_file: None,
    };
    info!("Installed solo package {}", dest.display());
    package.cleanup();
    Ok(Some(entry))
}
