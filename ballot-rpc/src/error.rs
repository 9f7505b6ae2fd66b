//! Error types for RPC operations

use thiserror::Error;

/// Errors that can occur while exchanging requests
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol deserialization error
    #[error("Protocol error: {0}")]
    ProtocolDeserialization(#[from] bincode::error::DecodeError),

    /// Protocol serialization error
    #[error("Protocol error: {0}")]
    ProtocolSerialization(#[from] bincode::error::EncodeError),

    /// A frame exceeded the size limit
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The peer speaks another protocol version
    #[error("Incompatible protocol version: peer={found}, local={expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    /// Server returned an error
    #[error("Server error: {0}")]
    ServerError(String),

    /// Server answered with a payload the request does not expect
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timeout
    #[error("Request timeout")]
    Timeout,
}

impl RpcError {
    /// Returns `true` if the request never got a verdict from the server
    ///
    /// Anything else means the server was reached and answered.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::Timeout
        )
    }
}

/// Result type for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
