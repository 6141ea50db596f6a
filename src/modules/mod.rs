// src/modules/mod.rs

//! Code modules: the freezing seam and per-package module bookkeeping

pub mod freezer;
pub mod registry;

pub use freezer::{Freezer, ModuleDef, ModuleOrigin, SourceFreezer, FROZEN_MODULES_ENTRY, MAIN_MODULE_NAME};
pub use registry::ModuleRegistry;

/// Module name for a source file path relative to a package root:
/// `a/b/c.py` is `a.b.c`, `a/b/__init__.py` is `a.b`.
pub fn module_name_for_path(target: &str) -> Option<String> {
    let stem = target.strip_suffix(".py")?;
    let stem = stem.strip_suffix("/__init__").unwrap_or(stem);
    if stem.is_empty() || stem == "__init__" {
        return None;
    }
    Some(stem.replace('/', "."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_for_path() {
        assert_eq!(module_name_for_path("main.py").as_deref(), Some("main"));
        assert_eq!(module_name_for_path("game/world.py").as_deref(), Some("game.world"));
        assert_eq!(module_name_for_path("game/__init__.py").as_deref(), Some("game"));
        assert_eq!(module_name_for_path("__init__.py"), None);
        assert_eq!(module_name_for_path("readme.txt"), None);
    }
}
