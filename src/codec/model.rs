// src/codec/model.rs

//! Model files and the textures they reference
//!
//! The source model format (`.egg`) is TOML text; the binary format (`.bam`)
//! is the same scene serialized as CBOR. Textures are listed as
//! `[[texture]]` tables with a `filename` relative to the model, an optional
//! `alpha_filename`, and optional inline `pixels` (hex) used when no backing
//! file exists.

use crate::error::{Error, Result};
use crate::files::classifier::{self, MODEL_BINARY_EXTENSION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A texture referenced by a model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextureRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// In-archive path once finalized; source-relative path on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_filename: Option<String>,
    /// Raw pixel data as hex, embedded when the texture has no file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels: Option<String>,
    /// Resolved on-disk location of `filename`
    #[serde(skip)]
    pub source: Option<PathBuf>,
    #[serde(skip)]
    pub alpha_source: Option<PathBuf>,
}

impl TextureRef {
    pub fn has_ram_image(&self) -> bool {
        self.pixels.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Drop the file reference so the pixels travel inside the model
    pub fn embed_ram_image(&mut self) {
        self.filename = None;
        self.alpha_filename = None;
        self.source = None;
        self.alpha_source = None;
    }
}

/// In-memory scene graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default, rename = "texture")]
    pub textures: Vec<TextureRef>,
    /// Everything else in the model, carried through untouched
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Loads and serializes models
pub trait ModelCodec: fmt::Debug {
    fn load(&self, path: &Path) -> Result<Scene>;
    fn serialize(&self, scene: &Scene) -> Result<Vec<u8>>;
}

/// Codec for the text and binary model formats
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneCodec;

impl SceneCodec {
    fn resolve_textures(scene: &mut Scene, base: &Path) {
        let resolve = |name: &Option<String>| -> Option<PathBuf> {
            let name = name.as_ref()?;
            let path = Path::new(name);
            let full = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };
            full.is_file().then_some(full)
        };
        for texture in &mut scene.textures {
            texture.source = resolve(&texture.filename);
            texture.alpha_source = resolve(&texture.alpha_filename);
        }
    }

    /// Decode a binary model
    pub fn decode(&self, data: &[u8]) -> Result<Scene> {
        ciborium::from_reader(data)
            .map_err(|e| Error::ParseError(format!("invalid binary model: {}", e)))
    }
}

impl ModelCodec for SceneCodec {
    fn load(&self, path: &Path) -> Result<Scene> {
        let ext = classifier::extension_of(&path.to_string_lossy());
        let mut scene = if ext == MODEL_BINARY_EXTENSION {
            let data = fs::read(path)?;
            self.decode(&data)?
        } else {
            let text = fs::read_to_string(path)
                .map_err(|e| Error::IoError(format!("cannot read model {}: {}", path.display(), e)))?;
            toml::from_str(&text)
                .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?
        };
        let base = path.parent().unwrap_or(Path::new("."));
        Self::resolve_textures(&mut scene, base);
        Ok(scene)
    }

    fn serialize(&self, scene: &Scene) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        ciborium::into_writer(scene, &mut buffer)
            .map_err(|e| Error::IoError(format!("cannot encode model: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_resolves_textures() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("maps")).unwrap();
        fs::write(temp.path().join("maps/wood.png"), b"png").unwrap();
        let model = temp.path().join("crate.egg");
        fs::write(
            &model,
            r#"
vertices = 8

[[texture]]
name = "wood"
filename = "maps/wood.png"

[[texture]]
name = "generated"
filename = "maps/missing.png"
pixels = "ff00ff"
"#,
        )
        .unwrap();

        let scene = SceneCodec.load(&model).unwrap();
        assert_eq!(scene.textures.len(), 2);
        assert_eq!(scene.textures[0].source, Some(temp.path().join("maps/wood.png")));
        assert!(scene.textures[1].source.is_none());
        assert!(scene.textures[1].has_ram_image());
        assert_eq!(scene.body["vertices"], serde_json::json!(8));
    }

    #[test]
    fn test_binary_round_trip() {
        let mut scene = Scene::default();
        scene.textures.push(TextureRef {
            filename: Some("imported_maps/wood.png".to_string()),
            ..TextureRef::default()
        });
        scene.body.insert("vertices".to_string(), serde_json::json!(8));

        let data = SceneCodec.serialize(&scene).unwrap();
        let decoded = SceneCodec.decode(&data).unwrap();
        assert_eq!(decoded.textures[0].filename, scene.textures[0].filename);
        assert_eq!(decoded.body, scene.body);
    }
}
