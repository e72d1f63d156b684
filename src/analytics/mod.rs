//! Analytics over partitioned sensor readings.
//!
//! This module contains:
//! - Per-partition statistics built on the store's read primitives
//! - Threshold anomaly detection
//! - The composite health score

pub mod aggregate;
pub mod anomaly;
pub mod health;

// Re-export commonly used types
pub use aggregate::{Aggregator, Condition, StatError, DEFAULT_PERCENTILES};
pub use anomaly::{AnomalyDetector, DEFAULT_THRESHOLD};
pub use health::{HealthReport, HealthScorer, SkipNote, SkipReason};
