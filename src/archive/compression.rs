// src/archive/compression.rs
//! Compression helpers
//!
//! Multifile entries are individually zstd-compressed; the whole archive is
//! additionally shipped as a gzip `.pz` sibling.

use crate::error::Error;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to compress {format} data: {source}")]
    Compression {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },

    #[error("Unsupported compression format: {0}")]
    UnsupportedFormat(String),
}

impl From<CompressionError> for Error {
    fn from(e: CompressionError) -> Self {
        Error::IoError(e.to_string())
    }
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.pz, .gz)
    Gzip,
    /// Zstandard compression (multifile entries)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".pz") || path.ends_with(".gz") {
            Self::Gzip
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Single-byte tag stored in front of multifile entry payloads
    pub fn tag(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Zstd => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CompressionError> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Zstd),
            other => Err(CompressionError::UnsupportedFormat(format!("tag {}", other))),
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Compress a buffer. `level` follows the 0-9 convention of the package
/// compression level.
pub fn compress(data: &[u8], format: CompressionFormat, level: u32) -> Result<Vec<u8>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(data.to_vec()),
        CompressionFormat::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
            encoder
                .write_all(data)
                .and_then(|_| encoder.finish())
                .map_err(|source| CompressionError::Compression { format: "gzip", source })
        }
        CompressionFormat::Zstd => {
            let level = i32::try_from(level.clamp(1, 19)).unwrap_or(3);
            zstd::encode_all(data, level)
                .map_err(|source| CompressionError::Compression { format: "zstd", source })
        }
    }
}

/// Create a decompressing reader for the given format
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|source| CompressionError::Decompression { format: "zstd", source })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Decompress a buffer
pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|source| CompressionError::Decompression {
            format: format.name(),
            source,
        })?;
    Ok(output)
}

/// Gzip `source` into `dest`
pub fn compress_file(source: &Path, dest: &Path, level: u32) -> crate::error::Result<()> {
    let input = File::open(source)
        .map_err(|e| Error::IoError(format!("cannot open {}: {}", source.display(), e)))?;
    let output = File::create(dest)
        .map_err(|e| Error::IoError(format!("cannot create {}: {}", dest.display(), e)))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::new(level.min(9)));
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_magic_bytes() {
        let gz = compress(b"hello", CompressionFormat::Gzip, 6).unwrap();
        let zst = compress(b"hello", CompressionFormat::Zstd, 6).unwrap();
        assert_eq!(CompressionFormat::from_magic_bytes(&gz), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_magic_bytes(&zst), CompressionFormat::Zstd);
        assert_eq!(CompressionFormat::from_magic_bytes(b"plain"), CompressionFormat::None);
    }

    #[test]
    fn test_decompress() {
        let data = b"the same text, the same text, the same text".repeat(20);
        for format in [CompressionFormat::None, CompressionFormat::Gzip, CompressionFormat::Zstd] {
            let packed = compress(&data, format, 9).unwrap();
            assert_eq!(decompress(&packed, format).unwrap(), data);
        }
    }

    #[test]
    fn test_tags() {
        for format in [CompressionFormat::None, CompressionFormat::Gzip, CompressionFormat::Zstd] {
            assert_eq!(CompressionFormat::from_tag(format.tag()).unwrap(), format);
        }
        assert!(CompressionFormat::from_tag(9).is_err());
        assert_eq!(CompressionFormat::from_extension("a.mf.pz"), CompressionFormat::Gzip);
    }

    #[test]
    fn test_compress_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.mf");
        let dest = temp.path().join("a.mf.pz");
        std::fs::write(&source, b"archive bytes").unwrap();
        compress_file(&source, &dest, 6).unwrap();

        let packed = std::fs::read(&dest).unwrap();
        assert_eq!(CompressionFormat::from_magic_bytes(&packed), CompressionFormat::Gzip);
        assert_eq!(decompress(&packed, CompressionFormat::Gzip).unwrap(), b"archive bytes");
    }
}
