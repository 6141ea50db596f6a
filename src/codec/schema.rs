// src/codec/schema.rs

//! Schema (IDL) files
//!
//! Schema files declare distributed classes and import the modules that
//! implement them:
//!
//! ```text
//! from game.ai import WorldAI/AI/OV, Spawner
//! import game.Base/OV
//! ```
//!
//! Imports seed implicit modules; the file itself is embedded with comments
//! stripped.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;

/// A name with optional `/SUFFIX` variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixedName {
    pub name: String,
    pub suffixes: Vec<String>,
}

impl SuffixedName {
    fn parse(text: &str) -> Self {
        let mut parts = text.trim().split('/');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let suffixes = parts
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { name, suffixes }
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.suffixes.iter().any(|s| s == suffix)
    }
}

/// One import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaImport {
    pub module: SuffixedName,
    /// Empty for a plain `import module`
    pub symbols: Vec<SuffixedName>,
}

/// A parsed schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    pub imports: Vec<SchemaImport>,
    /// Source text with comments and blank lines removed
    pub stripped: String,
}

/// Reads schema files
pub trait SchemaCodec: fmt::Debug {
    fn parse_text(&self, text: &str) -> Result<SchemaFile>;

    fn parse(&self, path: &Path) -> Result<SchemaFile> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("cannot read schema {}: {}", path.display(), e)))?;
        self.parse_text(&text)
    }
}

/// Codec for `.dc` schema text
#[derive(Debug, Clone, Copy, Default)]
pub struct DcCodec;

impl DcCodec {
    pub fn parse_str(&self, text: &str) -> SchemaFile {
        let stripped = strip_comments(text);
        let imports = stripped.lines().filter_map(parse_import).collect();
        SchemaFile { imports, stripped }
    }
}

impl SchemaCodec for DcCodec {
    fn parse_text(&self, text: &str) -> Result<SchemaFile> {
        Ok(self.parse_str(text))
    }
}

fn parse_import(line: &str) -> Option<SchemaImport> {
    let line = line.trim().trim_end_matches(';').trim();
    if let Some(rest) = line.strip_prefix("from ") {
        let (module, symbols) = rest.split_once(" import ")?;
        let symbols = symbols
            .split(',')
            .map(SuffixedName::parse)
            .filter(|s| !s.name.is_empty())
            .collect();
        Some(SchemaImport {
            module: SuffixedName::parse(module),
            symbols,
        })
    } else if let Some(rest) = line.strip_prefix("import ") {
        Some(SchemaImport {
            module: SuffixedName::parse(rest),
            symbols: Vec::new(),
        })
    } else {
        None
    }
}

/// Remove `//` and `/* */` comments (outside string literals) and blank lines
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        let lookahead = chars.peek().copied();
        match (c, lookahead) {
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            ('"' | '\'', _) => {
                in_string = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    let mut result: String = out
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
// Shared classes
from game.ai import WorldAI/AI/OV, Spawner   // trailing
import game.Base/OV;

/* block
   comment */
dclass WorldAI {
  setName(string = "http://x") required broadcast;
};
"#;

    #[test]
    fn test_parse_imports() {
        let file = DcCodec.parse_str(SCHEMA);
        assert_eq!(file.imports.len(), 2);

        let from = &file.imports[0];
        assert_eq!(from.module.name, "game.ai");
        assert_eq!(from.symbols.len(), 2);
        assert_eq!(from.symbols[0].name, "WorldAI");
        assert!(from.symbols[0].has_suffix("OV"));
        assert!(from.symbols[1].suffixes.is_empty());

        let plain = &file.imports[1];
        assert_eq!(plain.module.name, "game.Base");
        assert_eq!(plain.module.suffixes, vec!["OV".to_string()]);
        assert!(plain.symbols.is_empty());
    }

    #[test]
    fn test_strip_comments_keeps_strings() {
        let file = DcCodec.parse_str(SCHEMA);
        assert!(!file.stripped.contains("Shared classes"));
        assert!(!file.stripped.contains("block"));
        assert!(!file.stripped.contains("trailing"));
        assert!(file.stripped.contains("\"http://x\""));
        assert!(!file.stripped.lines().any(|l| l.trim().is_empty()));
    }
}
