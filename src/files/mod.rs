// src/files/mod.rs

//! Input file handling: classification, exclusion and the `PackFile` record

pub mod classifier;
pub mod exclude;
pub mod pack_file;

pub use classifier::{ExtensionTable, FileClassifier, FileFlags, FileOverrides};
pub use exclude::{ExcludePattern, ExclusionMatcher, ExclusionScope};
pub use pack_file::{PackFile, PackFileSpec};
