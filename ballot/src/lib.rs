//! Vote delivery between voting machines and a collector
//!
//! A voting machine runs a producer: every vote cast is spooled to disk and
//! pushed to the collector until it is accepted, then tracked until the
//! collector acknowledges it. The collector applies each vote to a
//! [`collector::Tally`] exactly once per envelope, however many times it is
//! delivered.

pub mod collector;
pub mod controller;
pub mod feed;
