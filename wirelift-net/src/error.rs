//! Error types for wirelift-net

use std::io;
use thiserror::Error;

/// Result type alias for wirelift-net operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or probing network identities
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid IP address
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid network prefix
    #[error("invalid network prefix: {0}")]
    InvalidPrefix(String),

    /// Invalid routing table selector
    #[error("invalid routing table: {0}")]
    InvalidTable(String),

    /// Interface not found
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
}

impl Error {
    /// Check if the error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::InterfaceNotFound(_))
            || matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    /// Check if the error was caused by malformed input rather than the host
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress(_) | Error::InvalidPrefix(_) | Error::InvalidTable(_)
        )
    }
}
