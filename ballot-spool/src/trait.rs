use async_trait::async_trait;
use ballot_common::Envelope;

/// Durable persistence behind a [`Spool`](crate::Spool)
///
/// A backing store only ever sees complete snapshots: whatever was passed to
/// the most recent successful `persist` is what `load` returns after a
/// restart.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Read the most recently persisted snapshot
    ///
    /// An empty store yields an empty snapshot, not an error.
    async fn load(&self) -> crate::Result<Vec<Envelope>>;

    /// Replace the persisted snapshot with `snapshot`
    async fn persist(&self, snapshot: &[Envelope]) -> crate::Result<()>;
}
