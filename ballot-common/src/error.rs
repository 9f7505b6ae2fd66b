//! Error types shared across the ballot crates.

use thiserror::Error;

/// Encoding or decoding of envelopes and payloads failed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The value decoded cleanly but did not consume the whole buffer.
    #[error("Trailing bytes: decoded {expected} of {actual} bytes")]
    TrailingBytes { expected: usize, actual: usize },
}

/// The destination could not take delivery of an envelope.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The payload is malformed and can never be applied.
    #[error("Decoding error: {0}")]
    Decoding(#[from] CodecError),

    /// The domain effect could not be applied.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The destination could not be reached at all.
    #[error("Destination unavailable: {0}")]
    Unavailable(String),
}

/// An acknowledgement could not be delivered back to the producer.
#[derive(Debug, Error)]
pub enum AckError {
    #[error("Ack receiver unreachable: {0}")]
    Unreachable(String),

    #[error("Ack rejected: {0}")]
    Rejected(String),
}
