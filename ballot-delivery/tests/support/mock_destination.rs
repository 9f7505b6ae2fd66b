//! In-process destination that records what it receives
//!
//! Optionally acknowledges each envelope through the callback it was handed,
//! the way a real destination does once the envelope has been applied.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ballot_common::{Acknowledge, Destination, Envelope, EnvelopeId, ReceiveError};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct MockDestination {
    received: Mutex<Vec<Envelope>>,
    auto_ack: AtomicBool,
    notify: Notify,
}

impl MockDestination {
    /// A destination that never acks on its own
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A destination that acks every envelope as soon as it receives it
    pub fn acking() -> Arc<Self> {
        let destination = Self::default();
        destination.auto_ack.store(true, Ordering::SeqCst);
        Arc::new(destination)
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().clone()
    }

    pub fn received_ids(&self) -> Vec<EnvelopeId> {
        self.received.lock().iter().map(Envelope::id).collect()
    }

    pub fn times_received(&self, id: &EnvelopeId) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|envelope| envelope.id() == *id)
            .count()
    }

    /// Wait until at least `count` envelopes have been received
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.received.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn receive(
        &self,
        envelope: Envelope,
        callback: Arc<dyn Acknowledge>,
    ) -> Result<(), ReceiveError> {
        let id = envelope.id();
        self.received.lock().push(envelope);
        self.notify.notify_waiters();

        if self.auto_ack.load(Ordering::SeqCst) {
            callback
                .ack(&id)
                .await
                .map_err(|e| ReceiveError::Unavailable(e.to_string()))?;
        }

        Ok(())
    }
}
