// src/hash.rs

//! SHA-256 hashing for archive descriptors
//!
//! Every archive, import descriptor and extracted file is described by a
//! size/timestamp/hash triple. Hashes are lowercase hex SHA-256.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hex length of a SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Compute the SHA-256 of a byte slice
#[inline]
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 of everything a reader yields
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Stream a file through SHA-256
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    Ok(sha256_reader(&mut file)?)
}

/// Check a file against an expected digest. Unreadable files never match.
pub fn file_matches(path: &Path, expected: &str) -> bool {
    match sha256_file(path) {
        Ok(actual) => actual.eq_ignore_ascii_case(expected),
        Err(_) => false,
    }
}

/// True if `value` looks like a hex SHA-256 digest
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}
