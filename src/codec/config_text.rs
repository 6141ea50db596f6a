// src/codec/config_text.rs

//! Config text files (`.prc`)
//!
//! Comments and blank lines are stripped before embedding. A configured
//! signing command runs over the stripped file and must succeed; with an
//! encryption key the file is encrypted and stored as `.pre`.

use crate::config::PackagerConfig;
use crate::error::{Error, Result};
use crate::files::classifier::{CONFIG_TEXT_EXTENSION, ENCRYPTED_CONFIG_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Environment variable carrying the encryption key to the encrypt command
pub const ENCRYPTION_KEY_VAR: &str = "PACKSMITH_ENCRYPTION_KEY";

/// A config file ready to embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedConfig {
    pub path: PathBuf,
    pub target: String,
    pub encrypted: bool,
}

/// Strips, signs and encrypts config text
#[derive(Debug, Clone, Default)]
pub struct ConfigTextProcessor {
    sign_command: Option<String>,
    encryption_key: Option<String>,
    encrypt_command: String,
}

fn shell(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    } else {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Drop comment lines and blank lines
pub fn strip_comments(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

impl ConfigTextProcessor {
    pub fn new(
        sign_command: Option<String>,
        encryption_key: Option<String>,
        encrypt_command: impl Into<String>,
    ) -> Self {
        Self {
            sign_command: sign_command.filter(|s| !s.trim().is_empty()),
            encryption_key: encryption_key.filter(|s| !s.is_empty()),
            encrypt_command: encrypt_command.into(),
        }
    }

    pub fn from_config(config: &PackagerConfig) -> Self {
        Self::new(
            config.sign_command.clone(),
            config.encryption_key.clone(),
            config.encrypt_command.clone(),
        )
    }

    /// Strip `text`, then sign and encrypt it as configured. `target` is the
    /// in-archive name of the original file; the returned target carries the
    /// encrypted extension when applicable.
    pub fn process(&self, text: &str, target: &str, scratch: &Path) -> Result<ProcessedConfig> {
        let base = Path::new(target)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.prc".to_string());
        let stripped_path = scratch.join(&base);
        fs::write(&stripped_path, strip_comments(text))?;

        if let Some(sign) = &self.sign_command {
            self.sign(sign, &stripped_path)?;
        }

        match &self.encryption_key {
            Some(key) => {
                let encrypted_path = stripped_path.with_extension(ENCRYPTED_CONFIG_EXTENSION);
                self.encrypt(key, &stripped_path, &encrypted_path)?;
                Ok(ProcessedConfig {
                    path: encrypted_path,
                    target: encrypted_target(target),
                    encrypted: true,
                })
            }
            None => Ok(ProcessedConfig {
                path: stripped_path,
                target: target.to_string(),
                encrypted: false,
            }),
        }
    }

    fn sign(&self, sign: &str, path: &Path) -> Result<()> {
        let command_line = format!("{} -n {}", sign, quoted(path));
        debug!("Signing config: {}", command_line);
        let status = shell(&command_line)
            .status()
            .map_err(|e| Error::CommandFailed(format!("{}: {}", command_line, e)))?;
        if !status.success() {
            return Err(Error::CommandFailed(format!(
                "signing command exited with {}: {}",
                status, command_line
            )));
        }
        Ok(())
    }

    fn encrypt(&self, key: &str, input: &Path, output: &Path) -> Result<()> {
        let command_line = self
            .encrypt_command
            .replace("{input}", &quoted(input))
            .replace("{output}", &quoted(output));
        let status = shell(&command_line)
            .env(ENCRYPTION_KEY_VAR, key)
            .status()
            .map_err(|e| Error::CommandFailed(format!("{}: {}", command_line, e)))?;
        if !status.success() || !output.exists() {
            return Err(Error::CommandFailed(format!(
                "encryption failed for {}",
                input.display()
            )));
        }
        Ok(())
    }
}

/// `settings.prc` becomes `settings.pre`
pub fn encrypted_target(target: &str) -> String {
    let suffix = format!(".{}", CONFIG_TEXT_EXTENSION);
    match target.strip_suffix(&suffix) {
        Some(stem) => format!("{}.{}", stem, ENCRYPTED_CONFIG_EXTENSION),
        None => format!("{}.{}", target, ENCRYPTED_CONFIG_EXTENSION),
    }
}
