//! Partitioned reading storage for the Farmsense Agent.
//!
//! Storage is deliberately narrow: append-only insert plus four read
//! primitives (group-reduce, sorted scan, count, partition listing). The
//! analytics layer is written entirely against this trait, so any ordered
//! log, relational, or document store can stand in for the in-memory
//! implementation.

pub mod memory;

use crate::telemetry::SensorReading;
use std::fmt;

pub use memory::MemoryStore;

/// Sort key for [`SensorStore::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortBy {
    /// Ascending by reading timestamp.
    Timestamp,
    /// Ascending by the named measurement value.
    Measurement(String),
}

/// Reduction applied across one measurement of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Average,
    Highest,
    Lowest,
}

/// Storage errors.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store failed or is unusable.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Append-only, partition-keyed reading store.
///
/// Partitions are created implicitly on first insert and grow monotonically.
/// A partition that was never written behaves as empty for every read
/// primitive. Concurrent inserts to different partitions must not block each
/// other; concurrent inserts to the same partition preserve each caller's
/// internal ordering but may interleave across callers.
pub trait SensorStore: Send + Sync {
    /// Append `readings` to a partition, preserving their order.
    fn insert(&self, partition_key: &str, readings: Vec<SensorReading>) -> Result<(), StoreError>;

    /// All readings of a partition, in insertion order or sorted by `sort`.
    fn scan(
        &self,
        partition_key: &str,
        sort: Option<SortBy>,
    ) -> Result<Vec<SensorReading>, StoreError>;

    /// Number of readings in a partition (0 for unknown partitions).
    fn count(&self, partition_key: &str) -> Result<u64, StoreError>;

    /// Partition names starting with `prefix`, sorted ascending.
    fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Group-reduce one measurement across a partition; `None` when the
    /// partition holds no values for that measurement.
    fn reduce(
        &self,
        partition_key: &str,
        measurement: &str,
        op: Reduce,
    ) -> Result<Option<f64>, StoreError>;
}
