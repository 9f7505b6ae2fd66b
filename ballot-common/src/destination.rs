//! Handles through which envelopes are delivered and acknowledged.
//!
//! Both traits are implemented twice: directly by the in-process component
//! (the collector's handler, the producer's ack receiver) and by an RPC stub
//! that forwards the call over the network.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{
    envelope::{Envelope, EnvelopeId},
    error::{AckError, ReceiveError},
};

/// Callback the destination invokes once it has applied an envelope
#[async_trait]
pub trait Acknowledge: Send + Sync + Debug {
    /// Acknowledge the envelope with the given id
    ///
    /// # Errors
    /// If the acknowledgement could not reach the producer
    async fn ack(&self, id: &EnvelopeId) -> Result<(), AckError>;
}

/// Something that takes delivery of envelopes
#[async_trait]
pub trait Destination: Send + Sync + Debug {
    /// Take delivery of `envelope`, acknowledging it through `callback` only
    /// once its effect has been applied
    ///
    /// Returning an error tells the sender the hand-off failed, so the
    /// envelope stays pending on the producer.
    ///
    /// # Errors
    /// If the envelope could not be decoded, applied, or (for remote
    /// destinations) transmitted
    async fn receive(
        &self,
        envelope: Envelope,
        callback: Arc<dyn Acknowledge>,
    ) -> Result<(), ReceiveError>;
}
