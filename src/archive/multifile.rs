// src/archive/multifile.rs
//! Tar-backed multifile archive
//!
//! Entries are kept in insertion order and written as a tar stream with a
//! fixed mtime, so identical inputs produce identical archives. Each entry's
//! payload starts with a one-byte compression tag followed by the (possibly
//! zstd-compressed) content. Application archives carry a `#!` header line
//! in front of the tar stream.

use crate::archive::Archive;
use crate::archive::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback mtime for archive entries when `SOURCE_DATE_EPOCH` is unset
pub const DEFAULT_ENTRY_MTIME: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    payload: Vec<u8>,
}

/// An archive of named entries
#[derive(Debug)]
pub struct Multifile {
    path: PathBuf,
    mode: Mode,
    header_prefix: Option<String>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    dirty: bool,
    closed: bool,
}

fn entry_mtime() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ENTRY_MTIME)
}

impl Multifile {
    /// Start a new, empty archive at `path`. Nothing touches the disk until
    /// the first flush.
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: Mode::ReadWrite,
            header_prefix: None,
            entries: Vec::new(),
            index: HashMap::new(),
            dirty: true,
            closed: false,
        }
    }

    /// Open an archive for reading and writing, loading existing entries
    pub fn open_read_write(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut archive = Self::create(&path);
        if path.exists() {
            archive.load()?;
            archive.dirty = false;
        }
        Ok(archive)
    }

    /// Open an existing archive read-only
    pub fn open_read(path: impl Into<PathBuf>) -> Result<Self> {
        let mut archive = Self::create(path);
        archive.mode = Mode::Read;
        archive.load()?;
        archive.dirty = false;
        Ok(archive)
    }

    fn load(&mut self) -> Result<()> {
        let data = fs::read(&self.path)
            .map_err(|e| Error::IoError(format!("cannot read {}: {}", self.path.display(), e)))?;

        let mut offset = 0;
        if data.starts_with(b"#!") {
            let end = data.iter().position(|&b| b == b'\n').map_or(data.len(), |p| p + 1);
            self.header_prefix = Some(String::from_utf8_lossy(&data[..end]).into_owned());
            offset = end;
        }

        let mut tar = tar::Archive::new(&data[offset..]);
        for entry in tar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let mut payload = Vec::new();
            entry.read_to_end(&mut payload)?;
            self.index.insert(name.clone(), self.entries.len());
            self.entries.push(Entry { name, payload });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode == Mode::Read {
            return Err(Error::IoError(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        if self.closed {
            return Err(Error::IoError(format!("{} is closed", self.path.display())));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header line written before the tar stream (self-executing archives)
    pub fn set_header_prefix(&mut self, prefix: impl Into<String>) {
        let mut prefix = prefix.into();
        if !prefix.ends_with('\n') {
            prefix.push('\n');
        }
        self.header_prefix = Some(prefix);
        self.dirty = true;
    }

    pub fn header_prefix(&self) -> Option<&str> {
        self.header_prefix.as_deref()
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Whether an entry is stored compressed
    pub fn is_compressed(&self, name: &str) -> Option<bool> {
        let entry = &self.entries[*self.index.get(name)?];
        entry.payload.first().map(|&tag| tag != CompressionFormat::None.tag())
    }

    /// Decompressed content of an entry
    pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(&idx) = self.index.get(name) else {
            return Ok(None);
        };
        let payload = &self.entries[idx].payload;
        let Some((&tag, body)) = payload.split_first() else {
            return Err(Error::ParseError(format!("empty entry payload for {}", name)));
        };
        let format = CompressionFormat::from_tag(tag)?;
        Ok(Some(compression::decompress(body, format)?))
    }

    fn write_out(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)
            .map_err(|e| Error::IoError(format!("cannot create {}: {}", self.path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        if let Some(prefix) = &self.header_prefix {
            writer.write_all(prefix.as_bytes())?;
        }

        let mtime = entry_mtime();
        let mut builder = tar::Builder::new(writer);
        for entry in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(entry.payload.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, &entry.name, entry.payload.as_slice())?;
        }
        let mut writer = builder.into_inner()?;
        writer.flush()?;
        self.dirty = false;
        debug!("Wrote {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

impl Archive for Multifile {
    fn add_entry(&mut self, name: &str, data: Vec<u8>, compression_level: u32) -> Result<bool> {
        self.ensure_writable()?;
        if self.index.contains_key(name) {
            return Ok(false);
        }

        let format = if compression_level == 0 {
            CompressionFormat::None
        } else {
            CompressionFormat::Zstd
        };
        let body = compression::compress(&data, format, compression_level)?;
        let mut payload = Vec::with_capacity(body.len() + 1);
        payload.push(format.tag());
        payload.extend_from_slice(&body);

        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(Entry {
            name: name.to_string(),
            payload,
        });
        self.dirty = true;
        Ok(true)
    }

    fn find_entry(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.dirty {
            self.write_out()?;
        }
        Ok(())
    }

    fn repack(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.write_out()
    }

    fn close(&mut self) -> Result<()> {
        if self.mode == Mode::ReadWrite && !self.closed && self.dirty {
            self.write_out()?;
        }
        self.closed = true;
        Ok(())
    }
}
