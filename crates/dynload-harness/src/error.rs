//! Harness error type and process exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for a failed library operation.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for malformed command-line input (matches clap).
pub const EXIT_USAGE: u8 = 2;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Library(#[from] dynload::Error),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    Usage(String),
    #[error("{errors} validation error(s) across {lines} log line(s)")]
    InvalidLog { lines: usize, errors: usize },
}

impl HarnessError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Library(dynload::Error::InvalidArgument(_)) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// `dynload` error class, for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Library(e) => e.kind().as_str(),
            Self::Io { .. } | Self::Json(_) | Self::InvalidLog { .. } => "io",
            Self::Usage(_) => "invalid_argument",
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
