//! The facade the delivery worker pushes envelopes through

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use ballot_common::{Acknowledge, Destination, Envelope, outgoing};
use parking_lot::RwLock;

use crate::error::TransportError;

/// Delivery target plus the identity the destination acks through
#[derive(Debug, Clone)]
pub struct Binding {
    pub destination: Arc<dyn Destination>,
    pub callback: Arc<dyn Acknowledge>,
}

impl Binding {
    pub fn new(destination: Arc<dyn Destination>, callback: Arc<dyn Acknowledge>) -> Self {
        Self {
            destination,
            callback,
        }
    }
}

/// Hands envelopes to whatever destination is currently bound
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Deliver `envelope` to the bound destination
    ///
    /// `Ok` means the destination accepted the hand-off, not that it has
    /// applied the envelope; that is signalled later through an ack.
    ///
    /// # Errors
    /// If nothing is bound, or the destination could not be reached or
    /// refused the envelope
    async fn push(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Replace the destination and callback for every subsequent push
    fn bind(&self, binding: Binding);
}

/// Default transport: a late-bound reference to a [`Destination`]
///
/// Pushes fail with [`TransportError::Unbound`] until the first call to
/// [`Transport::bind`], so envelopes submitted before the destination is
/// known simply wait in the spool.
#[derive(Debug, Default)]
pub struct BoundTransport {
    binding: RwLock<Option<Binding>>,
}

impl BoundTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.read().is_some()
    }
}

#[async_trait]
impl Transport for BoundTransport {
    async fn push(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let Some(binding) = self.binding.read().clone() else {
            return Err(TransportError::Unbound);
        };

        outgoing!(
            level = DEBUG,
            "Pushing envelope {} (seq {})",
            envelope.id(),
            envelope.sequence()
        );

        binding
            .destination
            .receive(envelope.clone(), binding.callback)
            .await
            .map_err(TransportError::from)
    }

    fn bind(&self, binding: Binding) {
        *self.binding.write() = Some(binding);
    }
}

#[cfg(test)]
mod tests {
    use ballot_common::{AckError, EnvelopeId, ReceiveError};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Recording {
        received: Mutex<Vec<EnvelopeId>>,
    }

    #[async_trait]
    impl Destination for Recording {
        async fn receive(
            &self,
            envelope: Envelope,
            _callback: Arc<dyn Acknowledge>,
        ) -> Result<(), ReceiveError> {
            self.received.lock().push(envelope.id());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Refusing;

    #[async_trait]
    impl Destination for Refusing {
        async fn receive(
            &self,
            _envelope: Envelope,
            _callback: Arc<dyn Acknowledge>,
        ) -> Result<(), ReceiveError> {
            Err(ReceiveError::Unavailable("closed".to_string()))
        }
    }

    #[derive(Debug)]
    struct NoAck;

    #[async_trait]
    impl Acknowledge for NoAck {
        async fn ack(&self, _id: &EnvelopeId) -> Result<(), AckError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_push_before_bind_fails() {
        let transport = BoundTransport::new();
        let result = transport.push(&Envelope::new(0, b"x".as_slice())).await;

        assert!(matches!(result, Err(TransportError::Unbound)));
        assert!(!transport.is_bound());
    }

    #[tokio::test]
    async fn test_push_reaches_bound_destination() {
        let transport = BoundTransport::new();
        let destination = Arc::new(Recording::default());
        transport.bind(Binding::new(destination.clone(), Arc::new(NoAck)));

        let envelope = Envelope::new(0, b"x".as_slice());
        transport.push(&envelope).await.expect("push");

        assert_eq!(*destination.received.lock(), vec![envelope.id()]);
    }

    #[tokio::test]
    async fn test_rebind_replaces_destination() {
        let transport = BoundTransport::new();
        transport.bind(Binding::new(Arc::new(Refusing), Arc::new(NoAck)));

        let envelope = Envelope::new(0, b"x".as_slice());
        assert!(matches!(
            transport.push(&envelope).await,
            Err(TransportError::Unreachable(_))
        ));

        let destination = Arc::new(Recording::default());
        transport.bind(Binding::new(destination.clone(), Arc::new(NoAck)));
        transport.push(&envelope).await.expect("push");

        assert_eq!(destination.received.lock().len(), 1);
    }
}
