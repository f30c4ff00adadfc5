//! # sweepr core
//!
//! The resumable, bounded-concurrency sweep engine and the storage it
//! relies on.
//!
//! * **[`engine`]**: drives a sweep and aggregates per-address outcomes.
//! * **[`pool`]**: the bounded task group that provides backpressure.
//! * **[`wal`]**: the write-ahead log that makes a sweep resumable.
//! * **[`cache`]**: the append-only record of probe results.
//! * **[`prober`]**: the reachability check, with an ICMP implementation.

pub mod cache;
pub mod engine;
pub mod error;
pub mod pool;
pub mod prober;
pub mod wal;

pub use engine::{EngineState, ProbeOutcome, ScanEngine, ScanSummary};
