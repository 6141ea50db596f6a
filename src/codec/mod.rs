// src/codec/mod.rs

//! Format-specific content codecs: schema files, models and config text

pub mod config_text;
pub mod model;
pub mod schema;

pub use config_text::{ConfigTextProcessor, ProcessedConfig};
pub use model::{ModelCodec, Scene, SceneCodec, TextureRef};
pub use schema::{DcCodec, SchemaCodec, SchemaFile, SchemaImport, SuffixedName};
