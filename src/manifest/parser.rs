// src/manifest/parser.rs

//! TOML manifest front-end
//!
//! ```toml
//! [[package]]
//! name = "app1"
//! type = "application"        # package (default), application or solo
//! steps = [
//!     { require = "toolkit", version = "1.2" },
//!     { config = { display_name = "App One" } },
//!     { file = ["main.py", "readme.txt"] },
//!     { main_module = "main" },
//! ]
//! ```
//!
//! Each step names exactly one action key; the remaining keys are its
//! arguments.

use crate::error::{Error, Result};
use crate::manifest::directive::{Directive, FileDirective, Statement};
use crate::package::PackageKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use toml::Spanned;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    config: Option<BTreeMap<String, toml::Value>>,
    require: Option<OneOrMany>,
    module: Option<OneOrMany>,
    rename_module: Option<String>,
    exclude_module: Option<OneOrMany>,
    main_module: Option<String>,
    freeze: Option<String>,
    file: Option<OneOrMany>,
    exclude: Option<String>,
    dir: Option<String>,

    version: Option<String>,
    host: Option<String>,
    new_name: Option<String>,
    filename: Option<String>,
    compile_to_exe: Option<bool>,
    forbid: Option<bool>,
    allow_children: Option<bool>,
    text: Option<String>,
    new_dir: Option<String>,
    extract: Option<bool>,
    executable: Option<bool>,
    delete_temp: Option<bool>,
    literal: Option<bool>,
    unprocessed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    name: Spanned<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    steps: Vec<Spanned<RawStep>>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    package: Vec<RawPackage>,
}

fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

fn parse_kind(kind: Option<&str>) -> Result<PackageKind> {
    match kind.unwrap_or("package") {
        "package" | "library" => Ok(PackageKind::Library),
        "application" | "app" => Ok(PackageKind::Application),
        "solo" => Ok(PackageKind::Solo),
        other => Err(Error::ParseError(format!("unknown package type \"{}\"", other))),
    }
}

fn config_value(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        _ => Err(Error::ParseError(format!(
            "config value for {} must be a string, number or boolean",
            key
        ))),
    }
}

impl RawStep {
    fn action_count(&self) -> usize {
        [
            self.config.is_some(),
            self.require.is_some(),
            self.module.is_some(),
            self.rename_module.is_some(),
            self.exclude_module.is_some(),
            self.main_module.is_some(),
            self.freeze.is_some(),
            self.file.is_some(),
            self.exclude.is_some(),
            self.dir.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    fn into_directive(self) -> Result<Directive> {
        if self.action_count() != 1 {
            return Err(Error::ParseError(
                "each step must name exactly one action".to_string(),
            ));
        }

        if let Some(config) = self.config {
            let pairs = config
                .iter()
                .map(|(k, v)| Ok((k.clone(), config_value(k, v)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Directive::Config(pairs));
        }
        if let Some(names) = self.require {
            return Ok(Directive::Require {
                names: names.into_vec(),
                version: self.version,
                host: self.host,
            });
        }
        if let Some(names) = self.module {
            return Ok(Directive::Module {
                names: names.into_vec(),
            });
        }
        if let Some(module) = self.rename_module {
            let new_name = self.new_name.ok_or_else(|| {
                Error::ParseError(format!("rename_module {} needs new_name", module))
            })?;
            return Ok(Directive::RenameModule { module, new_name });
        }
        if let Some(names) = self.exclude_module {
            return Ok(Directive::ExcludeModule {
                names: names.into_vec(),
                forbid: self.forbid.unwrap_or(false),
                allow_children: self.allow_children.unwrap_or(false),
            });
        }
        if let Some(module) = self.main_module {
            return Ok(Directive::MainModule {
                module,
                new_name: self.new_name,
                filename: self.filename,
            });
        }
        if let Some(filename) = self.freeze {
            return Ok(Directive::Freeze {
                filename,
                compile_to_exe: self.compile_to_exe.unwrap_or(false),
            });
        }
        if let Some(names) = self.file {
            return Ok(Directive::File(FileDirective {
                names: names.into_vec(),
                text: self.text,
                new_name: self.new_name,
                new_dir: self.new_dir,
                extract: self.extract,
                executable: self.executable,
                delete_temp: self.delete_temp.unwrap_or(false),
                literal: self.literal.unwrap_or(false),
            }));
        }
        if let Some(pattern) = self.exclude {
            return Ok(Directive::Exclude { pattern });
        }
        match self.dir {
            Some(dirname) => Ok(Directive::Dir {
                dirname,
                new_dir: self.new_dir,
                unprocessed: self.unprocessed,
            }),
            None => Err(Error::ParseError("step has no action".to_string())),
        }
    }
}

/// Parse manifest text into ordered statements
pub fn parse_manifest(text: &str) -> Result<Vec<Statement>> {
    let manifest: RawManifest = toml::from_str(text)?;
    let mut statements = Vec::new();

    for package in manifest.package {
        let name_line = line_of(text, package.name.span().start);
        let kind = parse_kind(package.kind.as_deref()).map_err(|e| e.at("manifest", name_line))?;
        statements.push(Statement {
            line: name_line,
            directive: Directive::BeginPackage {
                name: package.name.into_inner(),
                kind,
            },
        });

        let mut last_line = name_line;
        for step in package.steps {
            let line = line_of(text, step.span().start);
            let directive = step
                .into_inner()
                .into_directive()
                .map_err(|e| e.at("manifest", line))?;
            statements.push(Statement { line, directive });
            last_line = line;
        }

        statements.push(Statement {
            line: last_line,
            directive: Directive::EndPackage,
        });
    }
    Ok(statements)
}

/// Read and parse a manifest file
pub fn read_manifest(path: &Path) -> Result<Vec<Statement>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("cannot read {}: {}", path.display(), e)))?;
    parse_manifest(&text).map_err(|e| match e {
        Error::Located { line, source, .. } => Error::Located {
            file: path.display().to_string(),
            line,
            source,
        },
        other => other,
    })
}
