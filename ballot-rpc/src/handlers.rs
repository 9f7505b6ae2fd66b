//! Request handlers wiring the protocol to the delivery handles

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ballot_common::{Acknowledge, Destination, incoming};

use crate::{RemoteAck, Request, RequestCommand, Response, Result, RpcClient};

/// Collector side: hands delivered envelopes to a [`Destination`]
///
/// Each delivery comes with the producer's ack address, which becomes the
/// callback the destination acks through.
#[derive(Debug)]
pub struct DeliverHandler {
    destination: Arc<dyn Destination>,
    ack_timeout: Duration,
}

impl DeliverHandler {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self {
            destination,
            ack_timeout: Duration::from_secs(10),
        }
    }

    /// Timeout applied to each ack sent back to a producer
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

#[async_trait]
impl crate::RequestHandler for DeliverHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::Deliver { envelope, reply_to } => {
                incoming!(
                    level = DEBUG,
                    "Envelope {} delivered, acks go to {reply_to}",
                    envelope.id()
                );

                let callback = Arc::new(RemoteAck::new(
                    RpcClient::new(reply_to).with_timeout(self.ack_timeout),
                ));

                Ok(match self.destination.receive(envelope, callback).await {
                    Ok(()) => Response::accepted(),
                    Err(e) => Response::error(e.to_string()),
                })
            }
            command @ RequestCommand::Ack(_) => Ok(Response::error(format!(
                "{command} is not accepted by a collector"
            ))),
        }
    }
}

/// Producer side: applies acks from the collector
#[derive(Debug)]
pub struct AckHandler {
    acks: Arc<dyn Acknowledge>,
}

impl AckHandler {
    pub fn new(acks: Arc<dyn Acknowledge>) -> Self {
        Self { acks }
    }
}

#[async_trait]
impl crate::RequestHandler for AckHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::Ack(id) => {
                incoming!(level = DEBUG, "Ack received for envelope {id}");
                Ok(match self.acks.ack(&id).await {
                    Ok(()) => Response::acknowledged(),
                    Err(e) => Response::error(e.to_string()),
                })
            }
            command @ RequestCommand::Deliver { .. } => Ok(Response::error(format!(
                "{command} is not accepted by a producer"
            ))),
        }
    }
}
