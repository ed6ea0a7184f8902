//! Error types for the adapter lifecycle engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned across the platform apply boundary
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while managing tunnel adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Malformed tunnel configuration file
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Malformed or missing key material
    #[error("key error: {0}")]
    Key(String),

    /// Start request failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network helper error
    #[error("network error: {0}")]
    Net(#[from] wirelift_net::Error),

    /// Every interface slot is taken
    #[error("exceeded maximum number of interfaces ({0})")]
    Capacity(usize),

    /// The requested interface is bound to a different key
    #[error("`{0}` already exists and is in use by another key")]
    InUse(String),

    /// The requested key is already active on another interface
    #[error("peer with public key {public_key} is already active on `{native_name}`")]
    DuplicatePeer {
        public_key: String,
        native_name: String,
    },

    /// The platform apply step failed
    #[error("failed to start: {source}")]
    Start {
        #[source]
        source: BoxError,
    },

    /// An OS command exited unsuccessfully
    #[error("`{command}` exited with status {status}: {message}")]
    Command {
        command: String,
        status: i32,
        message: String,
    },

    /// No handshake was seen from the gating peer in time
    #[error("no handshake received from {endpoint} ({hostname}) for {interface} within {timeout} seconds")]
    NoHandshake {
        endpoint: String,
        hostname: String,
        interface: String,
        timeout: u64,
    },

    /// Route installation error
    #[error("route error: {0}")]
    Route(String),

    /// DNS integration error
    #[error("DNS error: {0}")]
    Dns(String),

    /// Conflicting default gateway claim
    #[error("default gateway error: {0}")]
    Gateway(String),

    /// Hook command failed
    #[error("{0}")]
    Hook(String),

    /// Interface or peer not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Allocation lock could not be taken
    #[error("allocation lock error: {0}")]
    Lock(String),

    /// Operation not supported by this platform
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Wrap an arbitrary apply failure, passing engine and I/O errors through
    pub fn from_apply(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => match err.downcast::<std::io::Error>() {
                Ok(io) => Error::Io(*io),
                Err(source) => Error::Start { source },
            },
        }
    }

    /// Check if this is a capacity or allocation conflict
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Error::Capacity(_) | Error::InUse(_) | Error::DuplicatePeer { .. }
        )
    }

    /// Check if this is a handshake liveness failure
    pub fn is_no_handshake(&self) -> bool {
        matches!(self, Error::NoHandshake { .. })
    }

    /// Check if retrying the same request could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoHandshake { .. } | Error::Lock(_) | Error::Io(_)
        )
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::ConfigParse(_) | Error::Parse { .. } | Error::Key(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_apply_passes_engine_errors() {
        let err = Error::from_apply(Box::new(Error::Capacity(3)));
        assert!(matches!(err, Error::Capacity(3)));
    }

    #[test]
    fn test_from_apply_passes_io_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from_apply(Box::new(io));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_apply_wraps_others() {
        let err = Error::from_apply("kernel said no".into());
        assert!(matches!(err, Error::Start { .. }));
        assert_eq!(err.to_string(), "failed to start: kernel said no");
    }

    #[test]
    fn test_predicates() {
        assert!(Error::InUse("wg0".into()).is_capacity());
        assert!(!Error::Hook("x".into()).is_capacity());
        let nh = Error::NoHandshake {
            endpoint: "1.2.3.4".into(),
            hostname: "1.2.3.4".into(),
            interface: "wg0".into(),
            timeout: 12,
        };
        assert!(nh.is_no_handshake());
        assert!(nh.is_recoverable());
    }
}
