//! The producer-side entry point to the delivery subsystem

use std::sync::Arc;

use ballot_common::{Destination, Envelope, EnvelopeId, Signal, internal};
use ballot_spool::{BackingStore, Spool};

use crate::{
    ack::AckReceiver,
    error::DeliveryError,
    in_flight::InFlight,
    processor::{DeliveryProcessor, SweepReport},
    transport::{Binding, Transport},
};

/// Submits payloads for delivery and owns the worker that delivers them
///
/// Cloning yields another handle onto the same producer.
#[derive(Debug, Clone)]
pub struct Producer {
    spool: Arc<Spool>,
    transport: Arc<dyn Transport>,
    processor: Arc<DeliveryProcessor>,
    acks: AckReceiver,
}

impl Producer {
    /// Recover the pending spool from `store` and prepare the worker
    ///
    /// Nothing is pushed until [`Self::serve`] or [`Self::sweep`] is called.
    ///
    /// # Errors
    /// If the processor configuration is invalid
    pub async fn start(
        store: Arc<dyn BackingStore>,
        transport: Arc<dyn Transport>,
        mut processor: DeliveryProcessor,
    ) -> Result<Self, DeliveryError> {
        let spool = Arc::new(Spool::open(store).await);
        processor.init(spool.clone(), transport.clone())?;
        let acks = AckReceiver::new(processor.in_flight.clone());

        Ok(Self {
            spool,
            transport,
            processor: Arc::new(processor),
            acks,
        })
    }

    /// Wrap `payload` in a new envelope and spool it for delivery
    ///
    /// Fire-and-forget: the envelope is pending once this returns, and a
    /// failure to persist it is logged rather than reported. The returned id
    /// is the one the destination will ack.
    pub async fn submit(&self, payload: impl Into<Arc<[u8]>> + Send) -> EnvelopeId {
        let envelope = Envelope::new(self.processor.sequence().allocate(), payload);
        let id = envelope.id();

        if let Err(e) = self.spool.add(envelope).await {
            internal!(
                level = WARN,
                "Envelope {id} is pending but was not persisted and would not survive a restart: {e}"
            );
        }

        self.processor.wake();
        id
    }

    /// Route future pushes to `destination`, acked through this producer
    pub fn bind_destination(&self, destination: Arc<dyn Destination>) {
        self.bind(Binding::new(destination, Arc::new(self.acks.clone())));
    }

    /// Route future pushes through an explicit binding
    pub fn bind(&self, binding: Binding) {
        internal!(level = INFO, "Binding delivery destination {:?}", binding.destination);
        self.transport.bind(binding);
        self.processor.wake();
    }

    /// Handle an acknowledgement from the destination
    pub fn ack(&self, id: &EnvelopeId) -> bool {
        self.acks.acknowledge(id)
    }

    /// The callback destinations should ack through
    pub const fn ack_receiver(&self) -> &AckReceiver {
        &self.acks
    }

    /// Make a single delivery pass immediately
    ///
    /// # Errors
    /// Only if the worker was never initialised, which [`Self::start`] rules
    /// out
    pub async fn sweep(&self) -> Result<SweepReport, DeliveryError> {
        self.processor.sweep().await
    }

    /// Run the delivery worker until shutdown
    ///
    /// # Errors
    /// If the worker fails to start
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        self.processor.serve(shutdown).await
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    pub fn in_flight(&self) -> &InFlight {
        self.processor.in_flight()
    }

    pub fn processor(&self) -> &DeliveryProcessor {
        &self.processor
    }
}
