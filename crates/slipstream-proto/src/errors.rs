//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short to contain a frame header.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Header claims more payload than the buffer holds.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims.
        expected: usize,
        /// Payload bytes actually present.
        actual: usize,
    },

    /// Payload size exceeds the protocol ceiling.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed payload size.
        size: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// Command value is not part of the protocol.
    #[error("unknown command {0}")]
    UnknownCommand(u32),

    /// Fixed-width payload has the wrong size for its command.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadMismatch {
        /// Size the fixed-width struct requires.
        expected: usize,
        /// Size received.
        actual: usize,
    },
}
