//! Sensor telemetry model for the Farmsense Agent.
//!
//! This module contains:
//! - The typed reading model and the static sensor schema table
//! - The table-driven line parser

pub mod parser;
pub mod types;

// Re-export commonly used types
pub use parser::{DropReason, Parser, ParserError};
pub use types::{
    partition_date, partition_key, ParsedReading, SensorMetadata, SensorReading, SensorType,
};
