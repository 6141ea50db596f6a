// src/lib.rs

//! Packsmith package assembler
//!
//! Builds distributable packages from declarative manifests: multifile
//! archives of code, assets and metadata, plus the descriptors that let
//! later builds patch them and other packages depend on them.
//!
//! # Architecture
//!
//! - Manifests become typed directives run against a [`Packager`]
//! - Each package is assembled in ordered passes by the [`ContentAssembler`]
//! - Requirements resolve through an in-process cache, local import
//!   descriptors and, optionally, a remote host
//! - Descriptors carry the patch lineage forward between builds

pub mod archive;
pub mod codec;
pub mod config;
pub mod contents;
pub mod deps;
pub mod descriptor;
pub mod env;
mod error;
pub mod files;
pub mod hash;
pub mod manifest;
pub mod modules;
pub mod package;
pub mod packager;
pub mod platform;
pub mod resolver;
pub mod version;

pub use config::PackagerConfig;
pub use contents::{ContentsIndex, PackageEntry};
pub use env::BuildEnv;
pub use error::{Error, Result};
pub use manifest::{evaluate_file, parse_manifest, Directive, ManifestEvaluator, Statement};
pub use package::{ContentAssembler, Package, PackageKind};
pub use packager::{BuiltPackage, Collaborators, Packager};
pub use resolver::{RequiredPackage, RequirementResolver};
pub use version::VersionKey;
