use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out per-producer sequence numbers
///
/// Recovery resumes one past the highest sequence still pending, or at zero
/// when nothing is pending. Numbers of envelopes that were delivered before
/// a restart may therefore be reused; sequence is informational and never
/// used for identity or ordering.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl SequenceAllocator {
    #[must_use]
    pub const fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Resume after the highest recovered sequence
    #[must_use]
    pub fn recovered(max_pending: Option<u64>) -> Self {
        Self::starting_at(max_pending.map_or(0, |max| max.saturating_add(1)))
    }

    /// Take the next sequence number
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The number the next call to [`Self::allocate`] would return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
