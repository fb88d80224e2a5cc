//! Collaborator errors.

use crate::error::ErrorCode;
use thiserror::Error;

/// Failure reported by an external collaborator.
#[derive(Debug, Error)]
pub enum CollabError {
    /// No element is registered under the requested path.
    #[error("no element at '{0}'")]
    NotFound(String),

    /// The element exists but has the wrong kind (sensor vs. control).
    #[error("element at '{path}' is not a {expected}")]
    WrongKind {
        path: String,
        expected: &'static str,
    },

    /// The provider is unreachable or dropped the connection.
    #[error("{0} unavailable")]
    Unavailable(String),

    /// The provider rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Local I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollabError {
    /// Creates an unavailable error.
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    /// Creates a rejected error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Returns `true` for connection-level failures (peer gone, socket reset).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl ErrorCode for CollabError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "COLLAB_NOT_FOUND",
            Self::WrongKind { .. } => "COLLAB_WRONG_KIND",
            Self::Unavailable(_) => "COLLAB_UNAVAILABLE",
            Self::Rejected(_) => "COLLAB_REJECTED",
            Self::Io(_) => "COLLAB_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }
}
