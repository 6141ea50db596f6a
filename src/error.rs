// src/error.rs

//! Crate-wide error type
//!
//! Fatal conditions abort the package currently being built and carry enough
//! context to point at the offending manifest statement. Recoverable problems
//! never reach this type: they are logged with `tracing::warn!` and skipped.

use thiserror::Error;

/// Errors produced while assembling packages
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Fatal for the package being built (missing main module, solo package
    /// with several files, archive move failure, ...)
    #[error("Package error: {0}")]
    PackageError(String),

    #[error("{0} encountered outside of package definition")]
    OutsideOfPackage(String),

    /// The core runtime package disagrees with the active runtime
    #[error("Runtime mismatch: {0}")]
    RuntimeMismatch(String),

    #[error("Unknown package {name}, version \"{version}\"")]
    UnknownPackage { name: String, version: String },

    #[error("Requirement cycle detected: {0}")]
    RequirementCycle(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    /// Wraps an error with the manifest location that triggered it
    #[error("{source} (line {line} of {file})")]
    Located {
        file: String,
        line: usize,
        source: Box<Error>,
    },
}

impl Error {
    /// Attach a manifest location to this error. Already-located errors keep
    /// their innermost location.
    pub fn at(self, file: impl Into<String>, line: usize) -> Self {
        match self {
            Error::Located { .. } => self,
            other => Error::Located {
                file: file.into(),
                line,
                source: Box::new(other),
            },
        }
    }

    /// True for errors that abort the current package
    pub fn is_fatal_for_package(&self) -> bool {
        match self {
            Error::Located { source, .. } => source.is_fatal_for_package(),
            Error::PackageError(_) | Error::RuntimeMismatch(_) | Error::CommandFailed(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Self {
        Error::ConfigError(format!("invalid pattern: {}", e))
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_wraps_once() {
        let err = Error::PackageError("no main module".to_string())
            .at("app.toml", 4)
            .at("other.toml", 9);
        match &err {
            Error::Located { file, line, .. } => {
                assert_eq!(file, "app.toml");
                assert_eq!(*line, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_fatal_for_package());
        assert_eq!(
            err.to_string(),
            "Package error: no main module (line 4 of app.toml)"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(!err.is_fatal_for_package());
    }
}
