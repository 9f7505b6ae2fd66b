//! Wire types exchanged between producers and the collector

use std::fmt::{self, Display, Formatter};

use ballot_common::{Envelope, EnvelopeId};
use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent to an RPC server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    pub version: u32,
    /// The actual command to execute
    pub command: RequestCommand,
}

/// Request command types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    /// Hand an envelope to the collector
    Deliver {
        envelope: Envelope,
        /// Address of the producer's ack server
        reply_to: String,
    },
    /// Acknowledge an envelope back to the producer that sent it
    Ack(EnvelopeId),
}

impl Display for RequestCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deliver { envelope, reply_to } => {
                write!(f, "Deliver({}, reply_to={reply_to})", envelope.id())
            }
            Self::Ack(id) => write!(f, "Ack({id})"),
        }
    }
}

/// Response returned by an RPC server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub version: u32,
    /// The actual response payload
    pub payload: ResponsePayload,
}

/// Response payload types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// The envelope was handed to the destination
    Accepted,
    /// The ack was applied
    Acknowledged,
    /// The command failed with an error message
    Error(String),
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub const fn accepted() -> Self {
        Self::with_payload(ResponsePayload::Accepted)
    }

    #[must_use]
    pub const fn acknowledged() -> Self {
        Self::with_payload(ResponsePayload::Acknowledged)
    }

    /// Create an error response
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_payload(ResponsePayload::Error(message.into()))
    }

    const fn with_payload(payload: ResponsePayload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Check if the response indicates success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}
