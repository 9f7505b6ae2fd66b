//! Durable store of envelopes that have not yet been handed to the transport.
//!
//! [`Spool`] is the authoritative pending set for a running producer. It keeps
//! an in-memory mirror for lock-free reads and writes a full snapshot through
//! a [`BackingStore`] on every mutation.

pub mod backends;
pub mod config;
pub mod error;
pub mod spool;
pub mod r#trait;

pub use backends::{FileBackingStore, MemoryBackingStore, TestBackingStore};
pub use config::SpoolConfig;
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use r#trait::BackingStore;
pub use spool::Spool;
