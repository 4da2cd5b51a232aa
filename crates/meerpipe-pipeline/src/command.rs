//! Typed external tool invocations.
//!
//! A `ToolCommand` is a program plus argv, never a shell string. Input paths
//! are checked when they are added, so a missing upstream file fails before
//! anything is spawned.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    stdout_to: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdout_to: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument that must already exist.
    pub fn input(self, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::Lookup(format!(
                "{} input not found: {}",
                self.program,
                path.display()
            )));
        }
        Ok(self.path(path))
    }

    /// Add a path argument without checking it.
    pub fn path(self, path: &Path) -> Self {
        let arg = path.display().to_string();
        self.arg(arg)
    }

    /// Capture standard output into a file.
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_stdout_to(&self) -> Option<&Path> {
        self.stdout_to.as_deref()
    }

    /// Shell-quoted form for logs and dry runs.
    pub fn display(&self) -> String {
        let mut out = quote(&self.program);
        for arg in &self.args {
            out.push(' ');
            out.push_str(&quote(arg));
        }
        if let Some(path) = &self.stdout_to {
            out.push_str(" > ");
            out.push_str(&quote(&path.display().to_string()));
        }
        out
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
