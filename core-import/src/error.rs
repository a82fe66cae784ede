//! # Import Error Types
//!
//! Error types for recording import operations.

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while importing a recording.
#[derive(Error, Debug)]
pub enum ImportError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The recording server could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection closed before the end-of-stream chunk arrived.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// No chunk arrived within the configured idle timeout.
    #[error("No chunk received within {0:?}")]
    Timeout(Duration),

    /// Any other failure reported by a host bridge.
    #[error("Bridge error: {0}")]
    Bridge(String),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// A frame on the wire did not match the chunk protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// The container could not be probed or holds no decodable audio.
    #[error("Unsupported or invalid audio format: {0}")]
    InvalidFormat(String),

    /// The codec decoder failed.
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Too many consecutive packets failed to decode.
    #[error("Corrupted audio stream: {0}")]
    CorruptedStream(String),

    // ========================================================================
    // Metadata Errors
    // ========================================================================
    /// The recording info document could not be fetched or parsed.
    #[error("Recording metadata unavailable: {0}")]
    Metadata(String),

    /// Launch parameters did not describe a valid session.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The project or a track sink rejected an operation. Raised by host
    /// implementations of the project traits.
    #[error("Track sink error: {0}")]
    Sink(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Invalid import configuration: {0}")]
    InvalidConfig(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    /// Returns `true` if the error came from the connection to the recording
    /// server rather than from the data it carried.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            ImportError::ConnectionFailed(_)
                | ImportError::ConnectionClosed(_)
                | ImportError::Timeout(_)
                | ImportError::Bridge(_)
        )
    }

    /// Returns `true` if the error is related to the audio container or codec.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ImportError::InvalidFormat(_)
                | ImportError::Decoder(_)
                | ImportError::CorruptedStream(_)
        )
    }

    /// Returns `true` if the error stops the whole import instead of a
    /// single track job.
    pub fn is_fatal_to_import(&self) -> bool {
        matches!(
            self,
            ImportError::Metadata(_)
                | ImportError::InvalidSession(_)
                | ImportError::InvalidConfig(_)
        )
    }
}

impl From<BridgeError> for ImportError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::ConnectionFailed(msg) => ImportError::ConnectionFailed(msg),
            BridgeError::ConnectionClosed(msg) => ImportError::ConnectionClosed(msg),
            other => ImportError::Bridge(other.to_string()),
        }
    }
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_errors_keep_their_kind() {
        let err: ImportError = BridgeError::ConnectionClosed("reset by peer".to_string()).into();
        assert!(matches!(err, ImportError::ConnectionClosed(_)));
        assert!(err.is_transport_error());

        let err: ImportError = BridgeError::Timeout("rec.example".to_string()).into();
        assert!(matches!(err, ImportError::Bridge(_)));
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_classification() {
        assert!(ImportError::CorruptedStream("x".to_string()).is_decode_error());
        assert!(!ImportError::Protocol("short".to_string()).is_transport_error());
        assert!(ImportError::Metadata("404".to_string()).is_fatal_to_import());
        assert!(!ImportError::ConnectionClosed("x".to_string()).is_fatal_to_import());
    }
}
