//! A single pass of the delivery worker over the pending spool

use std::{sync::Arc, time::Duration};

use ballot_common::{EnvelopeId, internal, outgoing};
use ballot_spool::Spool;
use ballot_tracing::traced;

use crate::{
    error::TransportError,
    in_flight::InFlight,
    processor::{DeliveryProcessor, SweepReport},
    transport::Transport,
};

/// Drops an in-flight entry unless the push it covers succeeded
///
/// The sweep future may be dropped mid-push on shutdown, in which case the
/// envelope is still pending and must not also read as awaiting its ack.
struct PushGuard<'a> {
    in_flight: &'a InFlight,
    id: EnvelopeId,
    accepted: bool,
}

impl<'a> PushGuard<'a> {
    const fn new(in_flight: &'a InFlight, id: EnvelopeId) -> Self {
        Self {
            in_flight,
            id,
            accepted: false,
        }
    }

    const fn accept(&mut self) {
        self.accepted = true;
    }
}

impl Drop for PushGuard<'_> {
    fn drop(&mut self) {
        if !self.accepted {
            self.in_flight.remove(&self.id);
        }
    }
}

/// Push every pending envelope once
///
/// Works from a snapshot of the spool, so envelopes submitted while the
/// sweep is running wait for the next one. Each push is bounded by the
/// processor's push timeout. An envelope is recorded as awaiting its ack for
/// the duration of its push and stays there only if the push succeeds, at
/// which point it leaves the spool.
#[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(pending = spool.len())), timing(precision = "ms"))]
pub async fn sweep_spool(
    processor: &DeliveryProcessor,
    spool: &Arc<Spool>,
    transport: &Arc<dyn Transport>,
) -> SweepReport {
    let mut report = SweepReport::default();

    if let Some(timeout) = processor.ack_timeout() {
        report.requeued = requeue_expired(processor, spool, timeout).await;
    }

    let push_timeout = processor.push_timeout();

    for envelope in spool.find_all() {
        let id = envelope.id();

        // Tracked before the push so an ack sent during the push is not lost
        processor.in_flight.insert(envelope.clone());
        let mut guard = PushGuard::new(&processor.in_flight, id);

        let outcome = tokio::time::timeout(push_timeout, transport.push(&envelope))
            .await
            .unwrap_or(Err(TransportError::Timeout(push_timeout)));

        match outcome {
            Ok(()) => {
                guard.accept();
                if let Err(e) = spool.remove(&id).await {
                    internal!(
                        level = WARN,
                        "Envelope {id} delivered but its removal was not persisted: {e}"
                    );
                }
                report.delivered += 1;
            }
            Err(e) => {
                drop(guard);
                outgoing!(
                    level = WARN,
                    "Failed to push envelope {id}, will retry next sweep: {e}"
                );
                report.failed += 1;
            }
        }
    }

    report
}

/// Return envelopes that have waited longer than `timeout` for an ack to
/// the pending spool
async fn requeue_expired(
    processor: &DeliveryProcessor,
    spool: &Spool,
    timeout: Duration,
) -> usize {
    let expired = processor.in_flight.take_expired(timeout);
    let count = expired.len();

    for envelope in expired {
        internal!(
            level = WARN,
            "No ack for envelope {} within {timeout:?}, returning it to the spool",
            envelope.id()
        );
        let id = envelope.id();
        if let Err(e) = spool.add(envelope).await {
            internal!(
                level = WARN,
                "Envelope {id} requeued in memory but not persisted: {e}"
            );
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use ballot_common::Envelope;

    use super::*;

    #[test]
    fn test_push_guard_clears_unaccepted_entry() {
        let in_flight = InFlight::new();
        let envelope = Envelope::new(0, b"abandoned".as_slice());
        in_flight.insert(envelope.clone());

        drop(PushGuard::new(&in_flight, envelope.id()));

        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_push_guard_keeps_accepted_entry() {
        let in_flight = InFlight::new();
        let envelope = Envelope::new(0, b"pushed".as_slice());
        in_flight.insert(envelope.clone());

        let mut guard = PushGuard::new(&in_flight, envelope.id());
        guard.accept();
        drop(guard);

        assert!(in_flight.contains(&envelope.id()));
    }
}
