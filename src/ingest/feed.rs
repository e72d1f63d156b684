//! Live telemetry feed seam and reconnection policy.
//!
//! Subscribe/unsubscribe semantics belong to the broker integration that
//! embeds the agent; the pipeline only needs an async source of raw text
//! payloads. [`ChannelFeed`] adapts any producer that can push into a tokio
//! channel, and [`StdinFeed`] lets the CLI treat piped input as a live feed.

use crate::config::FeedConfig;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

/// Feed errors. All feed failures are treated as transient: the pipeline
/// retries with backoff indefinitely.
#[derive(Debug)]
pub enum FeedError {
    Transient(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transient(msg) => write!(f, "transient feed error: {msg}"),
        }
    }
}

impl std::error::Error for FeedError {}

/// An unbounded source of raw telemetry lines.
pub trait TelemetryFeed {
    /// The next payload, `Ok(None)` once the feed has ended for good, or a
    /// transient error the caller should retry after.
    fn next_line(&mut self) -> impl std::future::Future<Output = Result<Option<String>, FeedError>> + Send;
}

/// Feed backed by a tokio channel; producers push payloads from wherever the
/// broker subscription lives.
pub struct ChannelFeed {
    receiver: mpsc::Receiver<String>,
}

impl ChannelFeed {
    pub fn new(receiver: mpsc::Receiver<String>) -> Self {
        Self { receiver }
    }

    /// Convenience constructor returning the producer half alongside the feed.
    pub fn pair(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self::new(receiver))
    }
}

impl TelemetryFeed for ChannelFeed {
    async fn next_line(&mut self) -> Result<Option<String>, FeedError> {
        // A closed channel means every producer hung up; the feed is done.
        Ok(self.receiver.recv().await)
    }
}

/// Feed reading newline-delimited payloads from standard input.
pub struct StdinFeed {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinFeed {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFeed for StdinFeed {
    async fn next_line(&mut self) -> Result<Option<String>, FeedError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| FeedError::Transient(e.to_string()))
    }
}

/// Capped exponential backoff for feed reconnection.
///
/// Delays double from the initial value up to the cap and never stop; the
/// feed is retried indefinitely until it delivers again.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(previous) => (previous * 2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    /// Reset after a successful delivery.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(3000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(3000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(3000));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_channel_feed_delivers_then_ends() {
        let (sender, mut feed) = ChannelFeed::pair(4);
        sender.send("line one".to_string()).await.unwrap();
        drop(sender);

        assert_eq!(feed.next_line().await.unwrap(), Some("line one".to_string()));
        assert_eq!(feed.next_line().await.unwrap(), None);
    }
}
