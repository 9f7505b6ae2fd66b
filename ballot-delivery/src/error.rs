//! Typed error handling for delivery operations.
//!
//! Transport failures are retried by the worker and never reach the
//! submitter; system errors mean the worker itself cannot run.

use std::time::Duration;

use ballot_common::ReceiveError;
use thiserror::Error;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A push failed; the envelope stays pending and is retried.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// System-level error (configuration, initialisation, spool).
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// A push did not hand the envelope to the destination.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No destination has been bound yet.
    #[error("No destination bound")]
    Unbound,

    /// The push did not complete within the configured timeout.
    #[error("Push timed out after {0:?}")]
    Timeout(Duration),

    /// The destination could not be reached.
    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    /// The destination was reached but refused the envelope.
    #[error("Destination rejected envelope: {0}")]
    Rejected(String),
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Delivery processor not initialized.
    #[error("Delivery processor not initialized: {0}")]
    NotInitialized(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    /// Returns `true` if this error is retried by the worker.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ReceiveError> for TransportError {
    fn from(error: ReceiveError) -> Self {
        match error {
            ReceiveError::Unavailable(reason) => Self::Unreachable(reason),
            ReceiveError::Decoding(err) => Self::Rejected(format!("undecodable payload: {err}")),
            ReceiveError::Rejected(reason) => Self::Rejected(reason),
        }
    }
}
