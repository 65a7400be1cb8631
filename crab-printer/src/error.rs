//! Error types for the printer library

use std::io::ErrorKind;
use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer is offline or unreachable
    #[error("Printer offline: {0}")]
    Offline(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The device accepted the connection but refused the data
    #[error("Rejected by printer: {0}")]
    Rejected(String),
}

impl PrintError {
    /// Whether this is a clean "device not reachable" signal rather than a fault.
    ///
    /// Refused or timed out connections and missing device nodes are clean;
    /// everything else (rejected data, broken pipes mid-write, bad config)
    /// is treated as an unexpected fault by callers tracking printer health.
    pub fn is_unreachable(&self) -> bool {
        match self {
            PrintError::Connection(_) | PrintError::Offline(_) | PrintError::Timeout(_) => true,
            PrintError::Io(e) => matches!(
                e.kind(),
                ErrorKind::NotFound
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::AddrNotAvailable
                    | ErrorKind::HostUnreachable
                    | ErrorKind::NetworkUnreachable
                    | ErrorKind::TimedOut
            ),
            PrintError::InvalidConfig(_) | PrintError::Rejected(_) => false,
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_classification() {
        assert!(PrintError::Connection("refused".into()).is_unreachable());
        assert!(PrintError::Timeout("probe".into()).is_unreachable());
        assert!(PrintError::Io(std::io::Error::from(ErrorKind::NotFound)).is_unreachable());

        assert!(!PrintError::Rejected("bad bytes".into()).is_unreachable());
        assert!(!PrintError::Io(std::io::Error::from(ErrorKind::BrokenPipe)).is_unreachable());
        assert!(!PrintError::InvalidConfig("x".into()).is_unreachable());
    }
}
