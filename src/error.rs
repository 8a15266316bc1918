use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the classification pipeline.
#[derive(Error, Debug)]
pub enum CoregError {
    /// An input line whose coordinate fields could not be read.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The volume source could not produce a cutout, even after retries.
    #[error("line {line}: volume source unavailable: {message}")]
    SourceUnavailable { line: usize, message: String },

    /// Opening, writing or flushing one of the output files failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the coordinate input failed. `line` is the last line read
    /// in full, so a resumed run can start from there.
    #[error("read error on {} after line {line}: {source}", path.display())]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The driver was asked to do something its current state forbids.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),
}

impl CoregError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoregError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoregError>;
