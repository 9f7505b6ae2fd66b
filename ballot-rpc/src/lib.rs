//! Network protocol between producers and the collector
//!
//! A producer pushes envelopes to the collector with `Deliver` requests and
//! the collector acknowledges them with `Ack` requests sent back to the
//! address the producer supplied. Each request travels on its own TCP
//! connection as a length-prefixed bincode frame.
//!
//! [`RemoteDestination`] and [`RemoteAck`] let either side treat the other
//! as an ordinary in-process handle.

pub mod client;
pub mod error;
mod frame;
pub mod handlers;
pub mod protocol;
pub mod remote;
pub mod server;

pub use client::RpcClient;
pub use error::{Result, RpcError};
pub use handlers::{AckHandler, DeliverHandler};
pub use protocol::{PROTOCOL_VERSION, Request, RequestCommand, Response, ResponsePayload};
pub use remote::{RemoteAck, RemoteDestination};
pub use server::{RequestHandler, RpcServer};
