//! Ingestion for the Farmsense Agent.
//!
//! This module contains:
//! - The live-feed seam and its reconnection policy
//! - The pipeline driving lines through the parser into storage

pub mod feed;
pub mod pipeline;

// Re-export commonly used types
pub use feed::{Backoff, ChannelFeed, FeedError, StdinFeed, TelemetryFeed};
pub use pipeline::{IngestError, IngestPipeline, IngestReport};
