//! Network-backed implementations of the delivery handles

use std::sync::Arc;

use async_trait::async_trait;
use ballot_common::{
    AckError, Acknowledge, Destination, Envelope, EnvelopeId, ReceiveError, outgoing,
};

use crate::{RpcClient, RpcError};

/// A collector reached over the network
///
/// The callback handed to [`Destination::receive`] cannot cross the wire, so
/// the collector is instead told to ack to `reply_to`, the address of this
/// producer's ack server.
#[derive(Debug, Clone)]
pub struct RemoteDestination {
    client: RpcClient,
    reply_to: String,
}

impl RemoteDestination {
    pub fn new(client: RpcClient, reply_to: impl Into<String>) -> Self {
        Self {
            client,
            reply_to: reply_to.into(),
        }
    }

    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }
}

#[async_trait]
impl Destination for RemoteDestination {
    async fn receive(
        &self,
        envelope: Envelope,
        _callback: Arc<dyn Acknowledge>,
    ) -> Result<(), ReceiveError> {
        let id = envelope.id();
        outgoing!(
            level = DEBUG,
            "Delivering envelope {id} to {}",
            self.client.address()
        );

        self.client
            .deliver(envelope, self.reply_to.clone())
            .await
            .map_err(|e| match e {
                RpcError::ServerError(reason) => ReceiveError::Rejected(reason),
                other => ReceiveError::Unavailable(other.to_string()),
            })
    }
}

/// Acks sent back to a producer over the network
#[derive(Debug, Clone)]
pub struct RemoteAck {
    client: RpcClient,
}

impl RemoteAck {
    pub const fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Acknowledge for RemoteAck {
    async fn ack(&self, id: &EnvelopeId) -> Result<(), AckError> {
        outgoing!(
            level = DEBUG,
            "Acknowledging envelope {id} to {}",
            self.client.address()
        );

        self.client.ack(*id).await.map_err(|e| {
            if e.is_unreachable() {
                AckError::Unreachable(e.to_string())
            } else {
                AckError::Rejected(e.to_string())
            }
        })
    }
}
