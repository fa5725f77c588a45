//! Error types for shufflewire.

use thiserror::Error;

/// Main error type for all shufflewire operations.
#[derive(Debug, Error)]
pub enum ShuffleError {
    /// I/O error while flushing frames to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream is corrupted (bad magic number, impossible frame
    /// length). Fatal: the connection must be torn down.
    #[error("network stream corrupted: {0}")]
    StreamCorrupted(String),

    /// A well-formed frame carried a message id outside the catalog.
    /// Fatal: new ids arrive only through version negotiation, which is
    /// out of scope for this protocol.
    #[error("unknown message id: {0}")]
    UnknownMessage(u8),

    /// Content-level deserialization failure (malformed event bytes,
    /// unknown data type ordinal). Recoverable at channel granularity.
    #[error("decode error: {0}")]
    Decode(String),

    /// MsgPack serialization error from the event codec.
    #[error("event encode error: {0}")]
    EventEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error from the event codec.
    #[error("event decode error: {0}")]
    EventDecode(#[from] rmp_serde::decode::Error),

    /// The peer (or caller) violated the credit/flow contract: a data
    /// frame with zero remaining credit, a non-positive credit grant,
    /// a mismatched partial-buffer count. Fatal to the connection.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Connection closed while frames were still queued.
    #[error("connection closed")]
    ConnectionClosed,
}

impl ShuffleError {
    /// Whether this error must tear down the whole connection.
    ///
    /// Content-level decode failures are reported to the owning channel
    /// only; everything else raised on the decode path kills the
    /// connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShuffleError::StreamCorrupted(_)
                | ShuffleError::UnknownMessage(_)
                | ShuffleError::ContractViolation(_)
        )
    }
}

/// Result type alias using ShuffleError.
pub type Result<T> = std::result::Result<T, ShuffleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ShuffleError::StreamCorrupted("bad magic".into()).is_fatal());
        assert!(ShuffleError::UnknownMessage(42).is_fatal());
        assert!(ShuffleError::ContractViolation("zero credit".into()).is_fatal());

        assert!(!ShuffleError::Decode("truncated event".into()).is_fatal());
        assert!(!ShuffleError::ConnectionClosed.is_fatal());
        assert!(!ShuffleError::Io(std::io::Error::other("boom")).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = ShuffleError::UnknownMessage(0x7F);
        assert_eq!(err.to_string(), "unknown message id: 127");

        let err = ShuffleError::StreamCorrupted("received incorrect magic number".into());
        assert!(err.to_string().contains("magic"));
    }
}
