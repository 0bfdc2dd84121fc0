//! Error types for tamarin-tester.
//!
//! Everything here is fatal to a run. Per-protocol timeouts and failures are
//! not errors; they travel as [`crate::harness::Outcome`] values instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing settings, reported before any protocol runs.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot scan protocol directory {}: {reason}", path.display())]
    Scan { path: PathBuf, reason: String },

    /// Malformed benchmark file. `line` is 1-based.
    #[error("{}:{line}: malformed benchmark record `{content}`: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
        reason: String,
    },

    #[error("benchmark file already exists at {}", path.display())]
    OutputExists { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("protocol id `{0}` contains whitespace and cannot be written to a benchmark file")]
    UnencodableId(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
