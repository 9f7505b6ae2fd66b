//! Backing store implementations for the spool
//!
//! - `file`: snapshot file on disk, for production use
//! - `memory`: in-process snapshot, for transient producers
//! - `test`: memory store with failure injection for tests

pub mod file;
pub mod memory;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
pub use test::TestBackingStore;
