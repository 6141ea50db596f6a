// src/package/handlers.rs

//! Per-extension content handlers
//!
//! Every file in a package is written by exactly one [`ContentHandler`],
//! picked by target extension. Unprocessed files and unknown extensions go
//! to the verbatim handler.

use crate::codec::{ConfigTextProcessor, ModelCodec, SchemaCodec};
use crate::error::{Error, Result};
use crate::files::PackFile;
use crate::files::classifier::{
    CONFIG_TEXT_EXTENSION, MODEL_BINARY_EXTENSION, MODEL_SOURCE_EXTENSION, SCHEMA_EXTENSION,
    SOURCE_EXTENSION,
};
use crate::modules::module_name_for_path;
use crate::package::Package;
use crate::package::assembler::AssemblyContext;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::rc::Rc;
use tracing::{debug, warn};

/// Write pass a handler contributes in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Registers modules with the freezer; nothing is written directly
    Modules,
    /// Ordinary archive entries
    Components,
    /// Runs last, once every texture-bearing file is in the archive
    Models,
}

/// Turns one kind of file into archive content
pub trait ContentHandler: fmt::Debug {
    fn phase(&self) -> Phase;

    /// Early scan before any module is registered
    fn scan(&self, _file: &PackFile, _package: &mut Package) -> Result<()> {
        Ok(())
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()>;
}

fn read_text(file: &PackFile) -> Result<String> {
    match &file.text {
        Some(text) => Ok(text.clone()),
        None => fs::read_to_string(&file.source)
            .map_err(|e| Error::IoError(format!("cannot read {}: {}", file.source.display(), e))),
    }
}

/// Stores the file as-is
#[derive(Debug, Default)]
pub struct VerbatimHandler;

impl ContentHandler for VerbatimHandler {
    fn phase(&self) -> Phase {
        Phase::Components
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()> {
        ctx.add_component(file)
    }
}

/// Source files become frozen modules
#[derive(Debug, Default)]
pub struct SourceModuleHandler;

impl ContentHandler for SourceModuleHandler {
    fn phase(&self) -> Phase {
        Phase::Modules
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()> {
        let Some(module) = module_name_for_path(&file.target) else {
            debug!("{} does not name a module", file.target);
            return Ok(());
        };

        let source = match &file.text {
            Some(text) => {
                let path = ctx.package.scratch_dir()?.join(file.basename());
                fs::write(&path, text)?;
                path
            }
            None => file.source.clone(),
        };
        ctx.package
            .modules
            .freezer_mut()
            .add_module(&module, None, Some(source.as_path()), false);
        Ok(())
    }
}

/// Schema files seed implicit module imports and are stored stripped
#[derive(Debug)]
pub struct SchemaHandler {
    codec: Box<dyn SchemaCodec>,
    client_suffixes: Vec<String>,
}

impl SchemaHandler {
    pub fn new(codec: Box<dyn SchemaCodec>, client_suffixes: Vec<String>) -> Self {
        Self {
            codec,
            client_suffixes,
        }
    }

    fn parse(&self, file: &PackFile) -> Result<crate::codec::SchemaFile> {
        match &file.text {
            Some(text) => self.codec.parse_text(text),
            None => self.codec.parse(&file.source),
        }
    }
}

impl ContentHandler for SchemaHandler {
    fn phase(&self) -> Phase {
        Phase::Components
    }

    fn scan(&self, file: &PackFile, package: &mut Package) -> Result<()> {
        let schema = self.parse(file)?;
        let freezer = package.modules.freezer_mut();
        for import in &schema.imports {
            let module = &import.module;
            freezer.add_module(&module.name, None, None, false);
            for suffix in &self.client_suffixes {
                if module.has_suffix(suffix) {
                    freezer.add_module(&format!("{}{}", module.name, suffix), None, None, false);
                }
            }

            // The symbol may itself be a module
            for symbol in &import.symbols {
                let qualified = format!("{}.{}", module.name, symbol.name);
                freezer.add_module(&qualified, None, None, true);
                for suffix in &self.client_suffixes {
                    if symbol.has_suffix(suffix) {
                        freezer.add_module(&format!("{}{}", qualified, suffix), None, None, true);
                    }
                }
            }
        }
        Ok(())
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()> {
        let schema = self.parse(file)?;
        ctx.add_component_bytes(
            &file.target,
            schema.stripped.into_bytes(),
            file.flags.compress,
            file.flags.extract,
            file.timestamp(),
        )
    }
}

/// Config text is stripped, then signed and encrypted as configured
#[derive(Debug)]
pub struct ConfigTextHandler {
    processor: ConfigTextProcessor,
}

impl ConfigTextHandler {
    pub fn new(processor: ConfigTextProcessor) -> Self {
        Self { processor }
    }
}

impl ContentHandler for ConfigTextHandler {
    fn phase(&self) -> Phase {
        Phase::Components
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()> {
        let text = read_text(file)?;
        let scratch = ctx.package.scratch_dir()?;
        let processed = self.processor.process(&text, &file.target, &scratch)?;
        let data = fs::read(&processed.path)?;
        ctx.add_component_bytes(
            &processed.target,
            data,
            file.flags.compress,
            file.flags.extract,
            file.timestamp(),
        )?;
        if let Err(e) = fs::remove_file(&processed.path) {
            debug!("Could not remove {}: {}", processed.path.display(), e);
        }
        Ok(())
    }
}

/// Target name of the binary form of a model
pub fn binary_model_target(target: &str) -> String {
    let suffix = format!(".{}", MODEL_SOURCE_EXTENSION);
    match target.strip_suffix(&suffix) {
        Some(stem) => format!("{}.{}", stem, MODEL_BINARY_EXTENSION),
        None => target.to_string(),
    }
}

/// Models are re-serialized with their textures resolved to archive paths
#[derive(Debug)]
pub struct ModelHandler {
    codec: Box<dyn ModelCodec>,
}

impl ModelHandler {
    pub fn new(codec: Box<dyn ModelCodec>) -> Self {
        Self { codec }
    }
}

impl ContentHandler for ModelHandler {
    fn phase(&self) -> Phase {
        Phase::Models
    }

    fn contribute(&self, file: &PackFile, ctx: &mut AssemblyContext<'_>) -> Result<()> {
        let target = binary_model_target(&file.target);
        if ctx.archive.find_entry(&target).is_some() {
            return Ok(());
        }

        let mut scene = self.codec.load(&file.source)?;
        for texture in &mut scene.textures {
            match texture.source.clone() {
                Some(source) => {
                    texture.filename = Some(ctx.add_found_texture(&source)?);
                    if let Some(alpha) = texture.alpha_source.clone() {
                        texture.alpha_filename = Some(ctx.add_found_texture(&alpha)?);
                    }
                }
                None if texture.has_ram_image() => texture.embed_ram_image(),
                None => {
                    if let Some(name) = &texture.filename {
                        warn!("Texture {} referenced by {} not found", name, file.target);
                    }
                }
            }
        }

        let data = self.codec.serialize(&scene)?;
        ctx.add_component_bytes(
            &target,
            data,
            file.flags.compress,
            file.flags.extract,
            file.timestamp(),
        )
    }
}

/// Extension to handler map
#[derive(Debug)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Rc<dyn ContentHandler>>,
    fallback: Rc<dyn ContentHandler>,
}

impl HandlerRegistry {
    /// Registry with the built-in handlers
    pub fn new(
        schema: Box<dyn SchemaCodec>,
        model: Box<dyn ModelCodec>,
        config_text: ConfigTextProcessor,
        client_suffixes: Vec<String>,
    ) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            fallback: Rc::new(VerbatimHandler),
        };
        registry.register(SOURCE_EXTENSION, Rc::new(SourceModuleHandler));
        registry.register(
            SCHEMA_EXTENSION,
            Rc::new(SchemaHandler::new(schema, client_suffixes)),
        );
        registry.register(
            CONFIG_TEXT_EXTENSION,
            Rc::new(ConfigTextHandler::new(config_text)),
        );
        let model: Rc<dyn ContentHandler> = Rc::new(ModelHandler::new(model));
        registry.register(MODEL_SOURCE_EXTENSION, Rc::clone(&model));
        registry.register(MODEL_BINARY_EXTENSION, model);
        registry
    }

    /// Add or replace the handler for an extension
    pub fn register(&mut self, extension: &str, handler: Rc<dyn ContentHandler>) {
        self.handlers.insert(extension.to_lowercase(), handler);
    }

    pub fn handler_for(&self, file: &PackFile) -> Rc<dyn ContentHandler> {
        if file.flags.unprocessed {
            return Rc::clone(&self.fallback);
        }
        self.handlers
            .get(&file.extension())
            .cloned()
            .unwrap_or_else(|| Rc::clone(&self.fallback))
    }
}
