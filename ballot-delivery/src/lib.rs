//! Reliable delivery of envelopes from a producer to a destination
//!
//! This crate provides:
//! - The delivery worker, sweeping the pending spool and pushing envelopes
//! - The transport facade the worker pushes through
//! - The awaiting-ack bookkeeping and the receiver that clears it
//! - The [`Producer`] service tying them together

mod ack;
mod error;
mod in_flight;
mod processor;
mod sequence;
mod service;
mod transport;

pub use ack::AckReceiver;
pub use error::{DeliveryError, SystemError, TransportError};
pub use in_flight::InFlight;
pub use processor::{DeliveryProcessor, SweepReport};
pub use sequence::SequenceAllocator;
pub use service::Producer;
pub use transport::{Binding, BoundTransport, Transport};
