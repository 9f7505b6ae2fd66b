use std::sync::Arc;

use ballot_common::{DeliveryState, Envelope, EnvelopeId, internal};
use ballot_tracing::traced;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::r#trait::BackingStore;

/// The durable pending store
///
/// Every mutation updates the in-memory map first and then writes the whole
/// map through the backing store. Writes are serialized by `write_lock`, and
/// the snapshot is captured while the lock is held, so the last write to
/// complete always carries the newest state.
///
/// A failed write is logged and reported, but the in-memory mutation stands:
/// memory is authoritative for the running process and the next successful
/// write brings the backing store back in line. Durability is therefore best
/// effort for a crash that coincides with a failed write.
#[derive(Debug)]
pub struct Spool {
    pending: DashMap<EnvelopeId, Envelope>,
    store: Arc<dyn BackingStore>,
    write_lock: Mutex<()>,
}

impl Spool {
    /// An empty spool over `store`, without reading what it already holds
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self {
            pending: DashMap::new(),
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a spool, recovering whatever `store` already holds
    pub async fn open(store: Arc<dyn BackingStore>) -> Self {
        let spool = Self::new(store);
        spool.recover().await;
        spool
    }

    /// Load the persisted snapshot into memory
    ///
    /// A snapshot that cannot be read is logged and treated as empty, so a
    /// corrupt store never prevents the producer from starting. Returns the
    /// number of envelopes recovered.
    #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
    pub async fn recover(&self) -> usize {
        match self.store.load().await {
            Ok(envelopes) => {
                let count = envelopes.len();
                for envelope in envelopes {
                    let envelope = envelope.with_state(DeliveryState::Pending);
                    self.pending.insert(envelope.id(), envelope);
                }
                internal!(level = INFO, "Recovered {count} pending envelopes");
                count
            }
            Err(err) => {
                internal!(
                    level = ERROR,
                    "Unable to recover the pending store, starting empty. Envelopes pending before the restart may be lost: {err}"
                );
                0
            }
        }
    }

    /// Add an envelope and persist the new snapshot before returning
    ///
    /// # Errors
    /// If the snapshot could not be persisted; the envelope is still pending
    /// in memory
    pub async fn add(&self, envelope: Envelope) -> crate::Result<()> {
        let id = envelope.id();
        self.pending
            .insert(id, envelope.with_state(DeliveryState::Pending));
        internal!(level = DEBUG, "Spooled envelope {id}");
        self.persist().await
    }

    /// Remove an envelope, persisting only if it was present
    ///
    /// # Errors
    /// If the snapshot could not be persisted; the envelope is still gone
    /// from memory
    pub async fn remove(&self, id: &EnvelopeId) -> crate::Result<Option<Envelope>> {
        let Some((_, envelope)) = self.pending.remove(id) else {
            return Ok(None);
        };

        internal!(level = DEBUG, "Unspooled envelope {id}");
        self.persist().await?;
        Ok(Some(envelope))
    }

    /// Snapshot of every pending envelope, ordered by id
    pub fn find_all(&self) -> Vec<Envelope> {
        let mut envelopes: Vec<_> = self
            .pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        envelopes.sort_by_key(Envelope::id);
        envelopes
    }

    pub fn find_by_id(&self, id: &EnvelopeId) -> Option<Envelope> {
        self.pending.get(id).map(|entry| entry.value().clone())
    }

    /// Replace the whole pending set
    ///
    /// # Errors
    /// If the snapshot could not be persisted
    pub async fn replace_all(
        &self,
        envelopes: impl IntoIterator<Item = Envelope> + Send,
    ) -> crate::Result<()> {
        self.pending.clear();
        for envelope in envelopes {
            self.pending
                .insert(envelope.id(), envelope.with_state(DeliveryState::Pending));
        }
        self.persist().await
    }

    /// Highest sequence number currently pending
    pub fn max_sequence(&self) -> Option<u64> {
        self.pending.iter().map(|entry| entry.sequence()).max()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    async fn persist(&self) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.find_all();

        self.store.persist(&snapshot).await.inspect_err(|err| {
            internal!(
                level = ERROR,
                "Failed to persist {} pending envelopes, continuing from memory: {err}",
                snapshot.len()
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{MemoryBackingStore, TestBackingStore};

    fn envelope(sequence: u64, payload: &str) -> Envelope {
        Envelope::new(sequence, payload.as_bytes())
    }

    #[tokio::test]
    async fn test_add_persists_before_returning() {
        let store = TestBackingStore::new();
        let spool = Spool::new(Arc::new(store.clone()));

        let first = envelope(0, "first");
        spool.add(first.clone()).await.expect("add");

        assert_eq!(spool.find_by_id(&first.id()), Some(first.clone()));
        assert_eq!(store.persisted(), vec![first]);
        assert_eq!(store.persist_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_does_not_persist() {
        let store = TestBackingStore::new();
        let spool = Spool::new(Arc::new(store.clone()));

        let removed = spool
            .remove(&EnvelopeId::generate())
            .await
            .expect("remove");

        assert!(removed.is_none());
        assert_eq!(store.persist_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_persists_updated_snapshot() {
        let store = TestBackingStore::new();
        let spool = Spool::new(Arc::new(store.clone()));

        let keep = envelope(0, "keep");
        let gone = envelope(1, "gone");
        spool.add(keep.clone()).await.expect("add");
        spool.add(gone.clone()).await.expect("add");

        let removed = spool.remove(&gone.id()).await.expect("remove");
        assert_eq!(removed, Some(gone));
        assert_eq!(store.persisted(), vec![keep]);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_memory_authoritative() {
        let store = TestBackingStore::new();
        let spool = Spool::new(Arc::new(store.clone()));

        store.fail_next_persists(1);
        let lost = envelope(0, "memory only");
        assert!(spool.add(lost.clone()).await.is_err());
        assert_eq!(spool.find_by_id(&lost.id()), Some(lost.clone()));
        assert!(store.persisted().is_empty());

        // The next successful write reconciles the backing store
        let next = envelope(1, "next");
        spool.add(next.clone()).await.expect("add");
        let persisted: HashSet<_> = store.persisted().into_iter().collect();
        assert_eq!(persisted, HashSet::from([lost, next]));
    }

    #[tokio::test]
    async fn test_find_all_is_a_detached_snapshot() {
        let spool = Spool::new(Arc::new(MemoryBackingStore::new()));
        spool.add(envelope(0, "a")).await.expect("add");

        let mut snapshot = spool.find_all();
        snapshot.clear();

        assert_eq!(spool.len(), 1);
        assert_eq!(spool.find_all().len(), 1);
    }

    #[tokio::test]
    async fn test_open_recovers_and_reports_max_sequence() {
        let store = TestBackingStore::new();
        store.seed(vec![envelope(3, "a"), envelope(7, "b"), envelope(5, "c")]);

        let spool = Spool::open(Arc::new(store)).await;

        assert_eq!(spool.len(), 3);
        assert_eq!(spool.max_sequence(), Some(7));
    }

    #[tokio::test]
    async fn test_unreadable_store_starts_empty() {
        let store = TestBackingStore::new();
        store.seed(vec![envelope(1, "a")]);
        store.fail_next_load();

        let spool = Spool::open(Arc::new(store)).await;

        assert!(spool.is_empty());
        assert_eq!(spool.max_sequence(), None);
    }

    #[tokio::test]
    async fn test_replace_all() {
        let store = TestBackingStore::new();
        let spool = Spool::new(Arc::new(store.clone()));
        spool.add(envelope(0, "old")).await.expect("add");

        let replacement = vec![envelope(10, "x"), envelope(11, "y")];
        spool
            .replace_all(replacement.clone())
            .await
            .expect("replace");

        let persisted: HashSet<_> = store.persisted().into_iter().collect();
        assert_eq!(persisted, replacement.into_iter().collect());
        assert_eq!(spool.max_sequence(), Some(11));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_all_persisted() {
        let store = TestBackingStore::new();
        let spool = Arc::new(Spool::new(Arc::new(store.clone())));

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let spool = spool.clone();
                tokio::spawn(async move { spool.add(envelope(i, &format!("vote {i}"))).await })
            })
            .collect();

        for handle in handles {
            handle.await.expect("task panicked").expect("add failed");
        }

        let ids: HashSet<_> = store.persisted().iter().map(Envelope::id).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(spool.len(), 100);
    }
}
