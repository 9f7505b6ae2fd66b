pub mod destination;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod vote;

pub use destination::{Acknowledge, Destination};
pub use envelope::{DeliveryState, Envelope, EnvelopeId};
pub use error::{AckError, CodecError, ReceiveError};
pub use tracing;
pub use vote::Vote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
