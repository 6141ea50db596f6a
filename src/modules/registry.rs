// src/modules/registry.rs

//! Module bookkeeping for one package
//!
//! Wraps the package's freezer, remembers which modules required packages
//! already provide, and builds the module table the package exports.

use crate::descriptor::ModuleRecord;
use crate::modules::freezer::{Freezer, MAIN_MODULE_NAME, ModuleOrigin};
use crate::resolver::RequiredPackage;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ModuleRegistry {
    freezer: Box<dyn Freezer>,
    skip_modules: BTreeMap<String, ModuleRecord>,
    exported: Vec<ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new(freezer: Box<dyn Freezer>) -> Self {
        Self {
            freezer,
            skip_modules: BTreeMap::new(),
            exported: Vec::new(),
        }
    }

    pub fn freezer(&self) -> &dyn Freezer {
        self.freezer.as_ref()
    }

    pub fn freezer_mut(&mut self) -> &mut dyn Freezer {
        self.freezer.as_mut()
    }

    /// Remember every module `required` exports so this package neither
    /// embeds nor re-lists it
    pub fn register_skips(&mut self, required: &RequiredPackage) {
        for (name, record) in &required.modules {
            self.skip_modules
                .entry(name.clone())
                .or_insert_with(|| record.clone());
        }
    }

    pub fn skip_modules(&self) -> &BTreeMap<String, ModuleRecord> {
        &self.skip_modules
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip_modules.contains_key(name)
    }

    /// Tell the freezer about upstream modules this package did not
    /// explicitly declare
    pub fn apply_skips(&mut self) {
        for (name, record) in &self.skip_modules {
            let declared = self
                .freezer
                .modules()
                .get(name)
                .is_some_and(|def| !def.implicit);
            if !declared {
                self.freezer.exclude_module(
                    name,
                    record.allow_children,
                    record.forbid,
                    ModuleOrigin::Skip,
                );
            }
        }
    }

    /// Build the exported module table from the finalized freezer state.
    ///
    /// Upstream modules, guesses, modules that were simply absent and the
    /// entry-point alias are left out. The freezer table is ordered, so the
    /// result is sorted by name.
    pub fn build_export_table(&mut self) -> &[ModuleRecord] {
        self.exported = self
            .freezer
            .modules()
            .iter()
            .filter(|(name, def)| {
                def.origin != ModuleOrigin::Skip
                    && !def.guess
                    && !(def.exclude && def.implicit)
                    && name.as_str() != MAIN_MODULE_NAME
            })
            .map(|(name, def)| ModuleRecord {
                name: name.clone(),
                exclude: def.exclude,
                forbid: def.forbid,
                allow_children: def.exclude && def.allow_children,
            })
            .collect();
        &self.exported
    }

    pub fn exported(&self) -> &[ModuleRecord] {
        &self.exported
    }

    /// Export table as a name-keyed map, as dependents consume it
    pub fn exported_map(&self) -> BTreeMap<String, ModuleRecord> {
        self.exported
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::freezer::SourceFreezer;
    use crate::platform::HostFamily;
    use std::fs;
    use tempfile::TempDir;

    fn upstream_with(modules: &[&str]) -> RequiredPackage {
        let mut package = RequiredPackage::named("toolkit");
        for m in modules {
            package
                .modules
                .insert(m.to_string(), ModuleRecord::new(m.to_string()));
        }
        package
    }

    #[test]
    fn test_skips_are_not_exported() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("game.py"), "").unwrap();
        let freezer = SourceFreezer::new(vec![temp.path().to_path_buf()], HostFamily::Posix);
        let mut registry = ModuleRegistry::new(Box::new(freezer));

        registry.register_skips(&upstream_with(&["foo"]));
        registry.freezer_mut().add_module("game", None, None, false);
        registry.freezer_mut().add_module("foo", None, None, true);
        registry.freezer_mut().add_module("missing", None, None, true);
        registry.apply_skips();
        registry.freezer_mut().done(false).unwrap();

        let names: Vec<_> = registry
            .build_export_table()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["game".to_string()]);
        assert!(registry.is_skipped("foo"));
    }

    #[test]
    fn test_explicit_exclusions_are_exported_with_flags() {
        let temp = TempDir::new().unwrap();
        let freezer = SourceFreezer::new(vec![temp.path().to_path_buf()], HostFamily::Posix);
        let mut registry = ModuleRegistry::new(Box::new(freezer));

        registry
            .freezer_mut()
            .exclude_module("tkinter", true, true, ModuleOrigin::Declared);
        registry
            .freezer_mut()
            .add_module("main", Some(MAIN_MODULE_NAME), None, false);
        registry.freezer_mut().done(false).unwrap();

        let exported = registry.build_export_table().to_vec();
        assert_eq!(exported.len(), 1);
        assert_eq!(
            exported[0],
            ModuleRecord {
                name: "tkinter".to_string(),
                exclude: true,
                forbid: true,
                allow_children: true,
            }
        );
    }
}
