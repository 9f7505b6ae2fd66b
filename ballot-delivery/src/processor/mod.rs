//! Delivery worker orchestration

pub mod sweep;

use std::{sync::Arc, time::Duration};

use ballot_common::{Signal, internal};
use ballot_spool::Spool;
use ballot_tracing::traced;
use serde::Deserialize;
use tokio::sync::{Mutex, Notify};

use crate::{
    error::{DeliveryError, SystemError},
    in_flight::InFlight,
    sequence::SequenceAllocator,
    transport::Transport,
};

const fn default_poll_interval() -> u64 {
    1000
}

const fn default_push_timeout() -> u64 {
    5000
}

/// Outcome of a single pass over the pending spool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Envelopes accepted by the transport and moved to awaiting-ack
    pub delivered: usize,
    /// Envelopes whose push failed and which stay pending
    pub failed: usize,
    /// Envelopes returned to the spool after waiting too long for an ack
    pub requeued: usize,
}

/// Background worker that drains the pending spool through a transport
///
/// On every tick the worker snapshots the spool, pushes each envelope, and
/// moves those the transport accepted into the awaiting-ack set. Failures
/// leave the envelope pending for the next tick; there is no retry budget
/// and no backoff beyond the poll interval.
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// Time between sweeps (in milliseconds)
    ///
    /// Default: 1000
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single push (in milliseconds)
    ///
    /// A push that exceeds this counts as a failure and the envelope stays
    /// pending. Default: 5000
    #[serde(default = "default_push_timeout")]
    pub push_timeout_ms: u64,

    /// How long an envelope may await its ack before being re-queued
    ///
    /// Re-queued envelopes are pushed again, so the destination must
    /// tolerate duplicates. Set to `None` to wait for acks indefinitely.
    ///
    /// Default: None
    #[serde(default)]
    pub ack_timeout_secs: Option<u64>,

    /// The pending spool (initialized in `init()`)
    #[serde(skip)]
    pub(crate) spool: Option<Arc<Spool>>,

    /// The transport to push through (initialized in `init()`)
    #[serde(skip)]
    pub(crate) transport: Option<Arc<dyn Transport>>,

    #[serde(skip)]
    pub(crate) in_flight: InFlight,

    /// Sequence numbers for new submissions (recovered in `init()`)
    #[serde(skip)]
    pub(crate) sequence: Arc<SequenceAllocator>,

    #[serde(skip)]
    pub(crate) wake: Notify,

    /// Held for the length of a sweep so passes never overlap
    #[serde(skip)]
    sweep_lock: Mutex<()>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            push_timeout_ms: default_push_timeout(),
            ack_timeout_secs: None,
            spool: None,
            transport: None,
            in_flight: InFlight::new(),
            sequence: Arc::default(),
            wake: Notify::new(),
            sweep_lock: Mutex::new(()),
        }
    }
}

impl DeliveryProcessor {
    /// Attach the spool and transport, and resume the sequence counter after
    /// whatever the spool recovered
    ///
    /// # Errors
    /// If the configured intervals are unusable
    pub fn init(
        &mut self,
        spool: Arc<Spool>,
        transport: Arc<dyn Transport>,
    ) -> Result<(), DeliveryError> {
        internal!("Initialising Delivery Processor ...");

        if self.poll_interval_ms == 0 {
            return Err(SystemError::Configuration(
                "poll_interval_ms must be greater than zero".to_string(),
            )
            .into());
        }

        if self.push_timeout_ms == 0 {
            return Err(SystemError::Configuration(
                "push_timeout_ms must be greater than zero".to_string(),
            )
            .into());
        }

        self.sequence = Arc::new(SequenceAllocator::recovered(spool.max_sequence()));
        internal!(
            level = INFO,
            "Delivery processor resuming with {} pending envelopes, next sequence {}",
            spool.len(),
            self.sequence.peek()
        );

        self.spool = Some(spool);
        self.transport = Some(transport);

        Ok(())
    }

    fn parts(&self) -> Result<(&Arc<Spool>, &Arc<dyn Transport>), DeliveryError> {
        match (&self.spool, &self.transport) {
            (Some(spool), Some(transport)) => Ok((spool, transport)),
            _ => Err(SystemError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            )
            .into()),
        }
    }

    /// Make a single pass over the pending spool
    ///
    /// A sweep requested while another is running waits for it to finish,
    /// then works from a fresh snapshot.
    ///
    /// # Errors
    /// If the processor has not been initialised
    pub async fn sweep(&self) -> Result<SweepReport, DeliveryError> {
        let (spool, transport) = self.parts()?;
        let _guard = self.sweep_lock.lock().await;
        Ok(sweep::sweep_spool(self, spool, transport).await)
    }

    /// Run the worker until a shutdown signal is received
    ///
    /// Sweeps run every `poll_interval_ms`, or sooner when [`Self::wake`] is
    /// called. Shutdown abandons a sweep mid-flight: envelopes it had not yet
    /// moved to awaiting-ack are still in the spool and are pushed again
    /// after a restart.
    ///
    /// # Errors
    /// If the processor has not been initialised
    #[traced(instrument(level = tracing::Level::TRACE, skip_all))]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!("Delivery processor starting");
        self.parts()?;

        let poll_interval = Duration::from_millis(self.poll_interval_ms);

        loop {
            tokio::select! {
                report = self.sweep() => {
                    match report {
                        Ok(report) if report.delivered + report.failed + report.requeued > 0 => {
                            internal!(
                                level = DEBUG,
                                "Sweep finished: {} delivered, {} failed, {} requeued",
                                report.delivered,
                                report.failed,
                                report.requeued
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            internal!(level = ERROR, "Error sweeping spool: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break;
                }
            }

            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                () = self.wake.notified() => {}
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break;
                }
            }
        }

        internal!("Delivery processor shutdown complete");
        Ok(())
    }

    /// Cut the current wait short and sweep immediately
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn sequence(&self) -> &SequenceAllocator {
        &self.sequence
    }

    pub const fn spool(&self) -> Option<&Arc<Spool>> {
        self.spool.as_ref()
    }

    fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_secs.map(Duration::from_secs)
    }
}

fn log_shutdown(sig: Result<Signal, tokio::sync::broadcast::error::RecvError>) {
    match sig {
        Ok(Signal::Shutdown | Signal::Finalised) => {
            internal!("Delivery processor received shutdown signal");
        }
        Err(e) => {
            internal!(level = ERROR, "Delivery processor shutdown channel error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let processor: DeliveryProcessor = ron::from_str("()").expect("parse");

        assert_eq!(processor.poll_interval_ms, 1000);
        assert_eq!(processor.push_timeout_ms, 5000);
        assert_eq!(processor.ack_timeout_secs, None);
    }

    #[test]
    fn test_config_overrides() {
        let processor: DeliveryProcessor =
            ron::from_str("(poll_interval_ms: 250, push_timeout_ms: 100, ack_timeout_secs: Some(30))")
                .expect("parse");

        assert_eq!(processor.poll_interval_ms, 250);
        assert_eq!(processor.push_timeout_ms, 100);
        assert_eq!(processor.ack_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_sweep_requires_init() {
        let processor = DeliveryProcessor::default();
        assert!(matches!(
            processor.sweep().await,
            Err(DeliveryError::System(SystemError::NotInitialized(_)))
        ));
    }

    #[test]
    fn test_init_rejects_zero_intervals() {
        let spool = Arc::new(Spool::new(Arc::new(ballot_spool::MemoryBackingStore::new())));
        let transport: Arc<dyn Transport> = Arc::new(crate::BoundTransport::new());

        let mut processor = DeliveryProcessor {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(processor.init(spool.clone(), transport.clone()).is_err());

        let mut processor = DeliveryProcessor {
            push_timeout_ms: 0,
            ..Default::default()
        };
        assert!(processor.init(spool, transport).is_err());
    }
}
