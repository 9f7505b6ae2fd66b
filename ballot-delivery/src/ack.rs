use async_trait::async_trait;
use ballot_common::{AckError, Acknowledge, EnvelopeId, incoming};

use crate::in_flight::InFlight;

/// Clears envelopes from the awaiting-ack set when the destination
/// acknowledges them
///
/// Acks are idempotent: an unknown or already-acked id is ignored.
#[derive(Debug, Clone)]
pub struct AckReceiver {
    in_flight: InFlight,
}

impl AckReceiver {
    pub const fn new(in_flight: InFlight) -> Self {
        Self { in_flight }
    }

    /// Returns `true` if `id` was awaiting an ack
    pub fn acknowledge(&self, id: &EnvelopeId) -> bool {
        if self.in_flight.remove(id).is_some() {
            incoming!(level = DEBUG, "Envelope {id} acknowledged");
            true
        } else {
            incoming!(level = DEBUG, "Ignoring ack for unknown envelope {id}");
            false
        }
    }
}

#[async_trait]
impl Acknowledge for AckReceiver {
    async fn ack(&self, id: &EnvelopeId) -> Result<(), AckError> {
        self.acknowledge(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ballot_common::Envelope;

    use super::*;

    #[tokio::test]
    async fn test_ack_clears_in_flight() {
        let in_flight = InFlight::new();
        let receiver = AckReceiver::new(in_flight.clone());
        let envelope = Envelope::new(0, b"x".as_slice());
        in_flight.insert(envelope.clone());

        receiver.ack(&envelope.id()).await.expect("ack");

        assert!(!in_flight.contains(&envelope.id()));
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_acks_are_noops() {
        let in_flight = InFlight::new();
        let receiver = AckReceiver::new(in_flight.clone());
        let envelope = Envelope::new(0, b"x".as_slice());
        in_flight.insert(envelope.clone());

        assert!(receiver.acknowledge(&envelope.id()));
        assert!(!receiver.acknowledge(&envelope.id()));
        assert!(!receiver.acknowledge(&EnvelopeId::generate()));
        receiver.ack(&EnvelopeId::generate()).await.expect("ack");
    }
}
