//! RPC server implementation

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use ballot_common::Signal;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
};
use tracing::{error, info, trace, warn};

use crate::{
    PROTOCOL_VERSION, Request, Response, Result, RpcError,
    frame::{read_frame, write_frame},
};

/// Handler trait for processing RPC requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be processed; the error is sent
    /// to the client as an error response
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

/// TCP server dispatching framed requests to a [`RequestHandler`]
pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    timeout: Duration,
}

impl RpcServer {
    /// Bind a new server to `address`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound
    pub async fn bind(address: &str, handler: Arc<dyn RequestHandler>) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("RPC server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handler,
            timeout: Duration::from_secs(30),
        })
    }

    /// Set the per-connection read/write timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The address actually bound, useful when binding to port 0
    ///
    /// # Errors
    /// If the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept errors are logged and the
    /// server keeps going
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let handler = Arc::clone(&self.handler);
                            let timeout = self.timeout;
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, timeout).await {
                                    error!("Error handling RPC connection from {peer}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting RPC connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            info!("RPC server shutting down");
                            break;
                        }
                        Err(e) => {
                            error!("RPC server shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single client connection
    async fn handle_connection(
        mut stream: TcpStream,
        handler: Arc<dyn RequestHandler>,
        timeout: Duration,
    ) -> Result<()> {
        let request: Request = tokio::time::timeout(timeout, read_frame::<Request, _>(&mut stream))
            .await
            .map_err(|_| RpcError::Timeout)??;

        trace!("Received request: {request:?}");

        let response = if request.is_version_compatible() {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling request: {e}");
                    Response::error(e.to_string())
                }
            }
        } else {
            warn!(
                "Rejecting request with protocol version {} (expected {PROTOCOL_VERSION})",
                request.version
            );
            Response::error(
                RpcError::IncompatibleVersion {
                    found: request.version,
                    expected: PROTOCOL_VERSION,
                }
                .to_string(),
            )
        };

        trace!("Sending response: {response:?}");

        tokio::time::timeout(timeout, write_frame(&mut stream, &response))
            .await
            .map_err(|_| RpcError::Timeout)??;

        Ok(())
    }
}
