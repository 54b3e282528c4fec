//! Error types for the RemoteKVM SSH engine

use std::fmt;

/// RFC 4253 disconnect reason: protocol error.
pub const REASON_PROTOCOL_ERROR: u32 = 2;
/// RFC 4253 disconnect reason: key exchange failed.
pub const REASON_KEY_EXCHANGE_FAILED: u32 = 3;
/// RFC 4253 disconnect reason: MAC error.
pub const REASON_MAC_ERROR: u32 = 5;
/// RFC 4253 disconnect reason: by application.
pub const REASON_BY_APPLICATION: u32 = 11;

/// Unified error type for all transport operations.
///
/// Every variant is fatal for the connection that produced it. The
/// cryptographic state (CTR counters, sequence numbers) cannot be resumed
/// after any failure, so callers tear the connection down.
#[derive(Debug)]
pub enum SshError {
    /// Socket error other than an orderly close
    Io(std::io::Error),

    /// Invalid server configuration
    Config(String),

    /// Unusable key material (missing file, bad encoding, key too small)
    Resource(String),

    /// Protocol violation (unexpected message, malformed field, bad state)
    Protocol(String),

    /// Algorithm negotiation failed
    AlgorithmMismatch(String),

    /// MAC verification failed
    ///
    /// Carries no detail on purpose: the peer only ever learns
    /// "authentication failed".
    Integrity,

    /// Peer closed the stream or sent SSH_MSG_DISCONNECT
    ConnectionClosed(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl SshError {
    /// Returns whether the error requires tearing down the connection.
    ///
    /// Always true: this layer never retries.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Maps the error to the reason code sent in a final SSH_MSG_DISCONNECT.
    pub fn disconnect_reason(&self) -> u32 {
        match self {
            SshError::Protocol(_) => REASON_PROTOCOL_ERROR,
            SshError::AlgorithmMismatch(_) => REASON_KEY_EXCHANGE_FAILED,
            SshError::Integrity => REASON_MAC_ERROR,
            _ => REASON_BY_APPLICATION,
        }
    }

    /// Builds a [`SshError::ConnectionClosed`] from an I/O error when the
    /// peer hung up, otherwise wraps it as [`SshError::Io`].
    pub fn from_io_read(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => {
                SshError::ConnectionClosed(format!("peer closed connection: {}", err))
            }
            _ => SshError::Io(err),
        }
    }
}

impl fmt::Display for SshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshError::Io(e) => write!(f, "IO error: {}", e),
            SshError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SshError::Resource(msg) => write!(f, "Resource error: {}", msg),
            SshError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SshError::AlgorithmMismatch(msg) => write!(f, "Algorithm negotiation failed: {}", msg),
            SshError::Integrity => write!(f, "authentication failed"),
            SshError::ConnectionClosed(msg) => write!(f, "Connection closed: {}", msg),
            SshError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for SshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SshError::Io(e) => Some(e),
            SshError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::Io(err)
    }
}

/// Result type for transport operations
pub type SshResult<T> = Result<T, SshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SshError::Config("Invalid configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_integrity_display_has_no_detail() {
        assert_eq!(SshError::Integrity.to_string(), "authentication failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SshError = io_err.into();
        assert!(matches!(err, SshError::Io(_)));
    }

    #[test]
    fn test_io_read_eof_is_connection_closed() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            SshError::from_io_read(eof),
            SshError::ConnectionClosed(_)
        ));

        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(SshError::from_io_read(other), SshError::Io(_)));
    }

    #[test]
    fn test_disconnect_reason_mapping() {
        assert_eq!(
            SshError::Protocol("x".into()).disconnect_reason(),
            REASON_PROTOCOL_ERROR
        );
        assert_eq!(SshError::Integrity.disconnect_reason(), REASON_MAC_ERROR);
        assert_eq!(
            SshError::AlgorithmMismatch("kex".into()).disconnect_reason(),
            REASON_KEY_EXCHANGE_FAILED
        );
        assert_eq!(
            SshError::Resource("key".into()).disconnect_reason(),
            REASON_BY_APPLICATION
        );
        assert!(SshError::Integrity.is_fatal());
    }

    #[test]
    fn test_result_type() {
        fn example() -> SshResult<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
