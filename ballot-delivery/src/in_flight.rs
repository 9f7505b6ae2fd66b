use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ballot_common::{DeliveryState, Envelope, EnvelopeId};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Entry {
    envelope: Envelope,
    pushed_at: Instant,
}

/// Envelopes handed to the transport and awaiting acknowledgement
///
/// Held in memory only. A restart loses this set, so anything pushed but not
/// acked before a crash is neither pending nor in flight afterwards; the
/// destination is expected to have applied it already or never received it.
///
/// Cloning yields another handle onto the same set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    entries: Arc<DashMap<EnvelopeId, Entry>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `envelope` as pushed, timestamped now
    pub fn insert(&self, envelope: Envelope) {
        self.entries.insert(
            envelope.id(),
            Entry {
                envelope: envelope.with_state(DeliveryState::AwaitingAck),
                pushed_at: Instant::now(),
            },
        );
    }

    /// Remove the envelope with `id`, returning it if it was in flight
    pub fn remove(&self, id: &EnvelopeId) -> Option<Envelope> {
        self.entries.remove(id).map(|(_, entry)| entry.envelope)
    }

    pub fn contains(&self, id: &EnvelopeId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &EnvelopeId) -> Option<Envelope> {
        self.entries.get(id).map(|entry| entry.envelope.clone())
    }

    /// Ids currently awaiting an ack, in id order
    pub fn ids(&self) -> Vec<EnvelopeId> {
        let mut ids: Vec<_> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Remove and return every envelope pushed longer than `timeout` ago
    pub fn take_expired(&self, timeout: Duration) -> Vec<Envelope> {
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|entry| entry.pushed_at.elapsed() >= timeout)
            .map(|entry| *entry.key())
            .collect();

        expired.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
