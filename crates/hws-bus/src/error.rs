//! Event bus errors.
//!
//! Delivery failures are never errors (sends are fire-and-forget). Only
//! bringing the transport up can fail.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`BusError::Bind`] | `BUS_BIND_FAILED` | Yes |
//! | [`BusError::Runtime`] | `BUS_RUNTIME_FAILED` | No |

use hws_runtime::ErrorCode;
use std::net::SocketAddr;
use thiserror::Error;

/// Transport setup failure.
#[derive(Debug, Error)]
pub enum BusError {
    /// The listen address could not be bound (in use, permission denied).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The transport's async runtime could not be built.
    #[error("failed to start bus runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl BusError {
    /// Creates a bind error.
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }
}

impl ErrorCode for BusError {
    fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "BUS_BIND_FAILED",
            Self::Runtime(_) => "BUS_RUNTIME_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let addr: SocketAddr = "127.0.0.1:9081".parse().unwrap();
        let err = BusError::bind(addr, std::io::ErrorKind::AddrInUse.into());
        assert_eq!(err.code(), "BUS_BIND_FAILED");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("127.0.0.1:9081"));
    }
}
