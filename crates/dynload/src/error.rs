//! Error types for library loading and symbol resolution.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure raised by [`crate::Library`] operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value is malformed (interior NUL, negative offset).
    #[error("{0}")]
    InvalidArgument(String),

    /// The operation needs a loaded library but the handle is cleared.
    #[error("{0}")]
    Logic(String),

    /// The platform loader, or the follow-up file open, rejected `path`.
    #[error("Could not load library '{path}'\n{reason}")]
    Load { path: String, reason: String },

    /// A symbol could not be found, or the symbol table could not be read.
    #[error("{0}")]
    Symbol(String),

    /// More than one raw symbol demangles to a match for `name`.
    #[error("Could not get symbol '{name}': multiple matches")]
    AmbiguousSymbol { name: String, candidates: Vec<String> },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Logic,
    Load,
    Symbol,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Logic => "logic",
            Self::Load => "load",
            Self::Symbol => "symbol",
        }
    }
}

impl Error {
    /// Which of the four failure classes this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Logic(_) => ErrorKind::Logic,
            Self::Load { .. } => ErrorKind::Load,
            Self::Symbol(_) | Self::AmbiguousSymbol { .. } => ErrorKind::Symbol,
        }
    }

    pub(crate) fn null_handle() -> Self {
        Self::Logic("The dynamic library handle is null".to_string())
    }
}
