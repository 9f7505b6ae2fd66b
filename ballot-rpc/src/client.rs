//! Client for sending requests to an RPC server

use std::time::Duration;

use ballot_common::{Envelope, EnvelopeId};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::{
    Request, RequestCommand, Response, ResponsePayload, Result, RpcError,
    frame::{read_frame, write_frame},
};

/// Client for one remote RPC server
///
/// Every request opens a fresh connection, so a client is cheap to clone and
/// never holds a stale socket across a server restart.
#[derive(Debug, Clone)]
pub struct RpcClient {
    address: String,
    timeout: Duration,
}

impl RpcClient {
    /// Create a new client for the server at `address` (`host:port`)
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    /// - The server speaks another protocol version
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    async fn send_request_internal(&self, request: Request) -> Result<Response> {
        debug!("Connecting to {} for {}", self.address, request.command);
        let mut stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;

        write_frame(&mut stream, &request).await?;
        let response = read_frame::<Response, _>(&mut stream).await?;
        trace!("Received response: {response:?}");

        if !response.is_version_compatible() {
            return Err(RpcError::IncompatibleVersion {
                found: response.version,
                expected: crate::PROTOCOL_VERSION,
            });
        }

        Ok(response)
    }

    /// Push `envelope` to a collector, asking for acks at `reply_to`
    ///
    /// # Errors
    /// If the request fails or the collector refuses the envelope
    pub async fn deliver(&self, envelope: Envelope, reply_to: impl Into<String>) -> Result<()> {
        let response = self
            .send_request(Request::new(RequestCommand::Deliver {
                envelope,
                reply_to: reply_to.into(),
            }))
            .await?;

        expect_payload(response, &ResponsePayload::Accepted)
    }

    /// Acknowledge `id` to the producer
    ///
    /// # Errors
    /// If the request fails or the producer refuses the ack
    pub async fn ack(&self, id: EnvelopeId) -> Result<()> {
        let response = self
            .send_request(Request::new(RequestCommand::Ack(id)))
            .await?;

        expect_payload(response, &ResponsePayload::Acknowledged)
    }
}

fn expect_payload(response: Response, expected: &ResponsePayload) -> Result<()> {
    match response.payload {
        ResponsePayload::Error(message) => Err(RpcError::ServerError(message)),
        payload if payload == *expected => Ok(()),
        other => Err(RpcError::UnexpectedResponse(format!("{other:?}"))),
    }
}
