// src/manifest/mod.rs

//! Package manifests
//!
//! A manifest is parsed into an ordered list of typed [`Directive`]s, each
//! tagged with its source line, and then run by the [`ManifestEvaluator`].

pub mod directive;
pub mod evaluator;
pub mod parser;

pub use directive::{Directive, FileDirective, Statement};
pub use evaluator::{evaluate_file, ManifestEvaluator};
pub use parser::{parse_manifest, read_manifest};
