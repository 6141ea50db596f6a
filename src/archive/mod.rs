// src/archive/mod.rs

//! Archive container
//!
//! The assembler only talks to the [`Archive`] trait; [`Multifile`] is the
//! tar-backed implementation packages are written with.

pub mod compression;
pub mod multifile;

pub use compression::{CompressionError, CompressionFormat};
pub use multifile::Multifile;

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Logical operations performed against an archive container
pub trait Archive {
    /// Add an entry. Returns `false` (and changes nothing) if an entry with
    /// that name already exists. Level 0 stores the data uncompressed.
    fn add_entry(&mut self, name: &str, data: Vec<u8>, compression_level: u32) -> Result<bool>;

    /// Add an entry from a file on disk
    fn add_file(&mut self, name: &str, path: &Path, compression_level: u32) -> Result<bool> {
        let data = fs::read(path)?;
        self.add_entry(name, data, compression_level)
    }

    fn find_entry(&self, name: &str) -> Option<usize>;

    fn entry_count(&self) -> usize;

    /// Make pending entries durable
    fn flush(&mut self) -> Result<()>;

    /// Rewrite the archive compactly
    fn repack(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
