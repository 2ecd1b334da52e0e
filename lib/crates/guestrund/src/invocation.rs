//! Parsing of the argument manifest.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} does not name a program")]
    MissingProgram(PathBuf),
}

/// Program and arguments the payload is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Parse manifest text: the program on the first line, then one
    /// argument per line. Empty lines after the first are empty arguments.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let program = lines.next().filter(|line| !line.is_empty())?;
        Some(Self {
            program: program.to_string(),
            args: lines.map(ToString::to_string).collect(),
        })
    }

    /// Read and parse the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] if the file cannot be read or its first
    /// line is empty.
    pub fn load(path: &Path) -> Result<Self, InvocationError> {
        let text = std::fs::read_to_string(path).map_err(|source| InvocationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).ok_or_else(|| InvocationError::MissingProgram(path.to_path_buf()))
    }
}
