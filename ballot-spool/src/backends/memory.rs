use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ballot_common::Envelope;

use crate::r#trait::BackingStore;

/// In-memory backing store
///
/// Holds the last persisted snapshot behind an `RwLock`. Nothing survives the
/// process, so this is only suitable for tests and throwaway producers.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    pub(crate) snapshot: Arc<RwLock<Vec<Envelope>>>,
}

impl MemoryBackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes in the last persisted snapshot
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn load(&self) -> crate::Result<Vec<Envelope>> {
        Ok(self.snapshot.read()?.clone())
    }

    async fn persist(&self, snapshot: &[Envelope]) -> crate::Result<()> {
        *self.snapshot.write()? = snapshot.to_vec();
        Ok(())
    }
}
