//! Transports that inject failures in front of a real `BoundTransport`

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ballot_common::{Envelope, EnvelopeId};
use ballot_delivery::{Binding, BoundTransport, Transport, TransportError};
use parking_lot::Mutex;

/// Fails pushes according to a script, delegating the rest
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: BoundTransport,
    /// Every push fails while this is non-zero, decrementing it
    fail_all: AtomicUsize,
    /// Per-envelope failures remaining
    fail_ids: Mutex<HashMap<EnvelopeId, usize>>,
    /// Delay before each push reaches the destination
    delay: Mutex<Option<Duration>>,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` pushes, whatever the envelope
    pub fn fail_next(&self, count: usize) {
        self.fail_all.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` pushes of the envelope with `id`
    pub fn fail_envelope(&self, id: EnvelopeId, count: usize) {
        self.fail_ids.lock().insert(id, count);
    }

    pub fn delay_pushes(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self, id: &EnvelopeId) -> bool {
        if self
            .fail_all
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }

        let mut fail_ids = self.fail_ids.lock();
        match fail_ids.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn push(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.should_fail(&envelope.id()) {
            return Err(TransportError::Unreachable("injected failure".to_string()));
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.inner.push(envelope).await
    }

    fn bind(&self, binding: Binding) {
        self.inner.bind(binding);
    }
}
