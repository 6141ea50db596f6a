// src/deps/tool.rs

//! External dependency-listing tools

use crate::deps::parse;
use crate::platform::HostFamily;
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Lists the shared libraries a binary links against
pub trait DependencyLister: fmt::Debug {
    /// Library names or paths referenced by `file`; `None` when they could
    /// not be determined
    fn list_dependencies(&self, file: &Path) -> Option<Vec<String>>;
}

/// The platform tool used to list dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyTool {
    Dumpbin,
    Otool,
    Ldd,
}

impl DependencyTool {
    pub fn for_family(family: HostFamily) -> Self {
        match family {
            HostFamily::Windows => DependencyTool::Dumpbin,
            HostFamily::MacOs => DependencyTool::Otool,
            HostFamily::Posix => DependencyTool::Ldd,
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            DependencyTool::Dumpbin => "dumpbin",
            DependencyTool::Otool => "otool",
            DependencyTool::Ldd => "ldd",
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self {
            DependencyTool::Dumpbin => &["/dependents"],
            DependencyTool::Otool => &["-L"],
            DependencyTool::Ldd => &[],
        }
    }

    pub fn parse(&self, output: &str) -> Option<Vec<String>> {
        match self {
            DependencyTool::Dumpbin => parse::parse_dumpbin(output),
            DependencyTool::Otool => parse::parse_otool(output),
            DependencyTool::Ldd => parse::parse_ldd(output),
        }
    }
}

/// Runs the platform tool as a subprocess
#[derive(Debug)]
pub struct CommandLister {
    tool: DependencyTool,
    program: Option<PathBuf>,
    reported_missing: Cell<bool>,
}

impl CommandLister {
    pub fn new(tool: DependencyTool) -> Self {
        Self {
            program: which::which(tool.program()).ok(),
            tool,
            reported_missing: Cell::new(false),
        }
    }

    pub fn for_family(family: HostFamily) -> Self {
        Self::new(DependencyTool::for_family(family))
    }
}

impl DependencyLister for CommandLister {
    fn list_dependencies(&self, file: &Path) -> Option<Vec<String>> {
        let Some(program) = &self.program else {
            if !self.reported_missing.replace(true) {
                warn!(
                    "{} not found; shared library dependencies will not be scanned",
                    self.tool.program()
                );
            }
            return None;
        };

        debug!("Running {} on {}", self.tool.program(), file.display());
        let output = match Command::new(program).args(self.tool.args()).arg(file).output() {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run {}: {}", self.tool.program(), e);
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                "{} exited with {} for {}",
                self.tool.program(),
                output.status,
                file.display()
            );
            return None;
        }
        self.tool.parse(&String::from_utf8_lossy(&output.stdout))
    }
}
