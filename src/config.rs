//! Configuration for the Farmsense Agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Records per store insert during bulk replay
    pub batch_size: usize,

    /// Path for storing agent state
    pub data_path: PathBuf,

    /// Live feed reconnection policy
    pub feed: FeedConfig,

    /// Ideal measurement bands for health scoring
    pub ideal_bands: IdealBands,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("farmsense-agent");

        Self {
            batch_size: 1000,
            data_path: data_dir,
            feed: FeedConfig::default(),
            ideal_bands: IdealBands::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("farmsense-agent")
            .join("config.json")
    }
}

/// Reconnection policy for the live telemetry feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// First retry delay after a transient feed failure (milliseconds)
    pub backoff_initial_ms: u64,
    /// Retry delay cap (milliseconds)
    pub backoff_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Inclusive acceptable range for one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Whether a value lies within `[low, high]` inclusive.
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Ideal bands keyed by measurement name, used only by the health scorer.
///
/// Passed explicitly into [`crate::analytics::HealthScorer`] so each
/// deployment can carry its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdealBands {
    bands: BTreeMap<String, Band>,
}

impl Default for IdealBands {
    fn default() -> Self {
        let mut bands = BTreeMap::new();
        bands.insert("temperature".to_string(), Band::new(20.0, 27.0));
        bands.insert("humidity".to_string(), Band::new(40.0, 70.0));
        bands.insert("co2".to_string(), Band::new(350.0, 700.0));
        bands.insert("pH".to_string(), Band::new(5.3, 6.8));
        bands.insert("EC".to_string(), Band::new(1200.0, 1800.0));
        bands.insert("o2".to_string(), Band::new(35.0, 80.0));
        Self { bands }
    }
}

impl IdealBands {
    /// Band configuration with no entries; every measurement gets skipped.
    pub fn empty() -> Self {
        Self {
            bands: BTreeMap::new(),
        }
    }

    pub fn get(&self, measurement: &str) -> Option<&Band> {
        self.bands.get(measurement)
    }

    pub fn set(&mut self, measurement: impl Into<String>, band: Band) {
        self.bands.insert(measurement.into(), band);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Band)> {
        self.bands.iter()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 1000);
        assert!(config.ideal_bands.get("temperature").is_some());
        assert_eq!(config.feed.backoff_initial_ms, 500);
    }

    #[test]
    fn test_band_inclusive_bounds() {
        let band = Band::new(20.0, 27.0);
        assert!(band.contains(20.0));
        assert!(band.contains(27.0));
        assert!(band.contains(25.0));
        assert!(!band.contains(19.99));
        assert!(!band.contains(27.01));
    }

    #[test]
    fn test_default_bands_match_deployment() {
        let bands = IdealBands::default();
        assert_eq!(bands.get("co2"), Some(&Band::new(350.0, 700.0)));
        assert_eq!(bands.get("EC"), Some(&Band::new(1200.0, 1800.0)));
        assert_eq!(bands.get("Red"), None);
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.batch_size, config.batch_size);
        assert_eq!(restored.ideal_bands, config.ideal_bands);
    }
}
