//! Composite health score over the latest reading of each sensor category.

use crate::analytics::aggregate::{Aggregator, StatError};
use crate::config::IdealBands;
use crate::store::{SensorStore, SortBy};
use crate::telemetry::{partition_date, SensorReading, SensorType};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Why a category or measurement did not contribute to the score.
///
/// Skips are advisory, not errors; a young deployment simply has fewer
/// evaluated measurements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The sensor type has no partitions yet.
    NoPartitions,
    /// The chosen partition holds no readings in range.
    NoReadings { partition: String },
    /// The measurement has no configured ideal band.
    UnbandedMeasurement { measurement: String },
}

/// Advisory note about a skipped category or measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipNote {
    pub sensor_type: SensorType,
    pub reason: SkipReason,
}

impl fmt::Display for SkipNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SkipReason::NoPartitions => {
                write!(f, "{}: no partitions yet", self.sensor_type)
            }
            SkipReason::NoReadings { partition } => {
                write!(f, "{}: no readings in {partition}", self.sensor_type)
            }
            SkipReason::UnbandedMeasurement { measurement } => {
                write!(
                    f,
                    "{}: no ideal band configured for {measurement}",
                    self.sensor_type
                )
            }
        }
    }
}

/// Outcome of one scoring pass.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Signed sum of in-band (+1) and out-of-band (-1) measurements.
    pub score: i64,
    /// Number of measurements that contributed to the score.
    pub evaluated: u64,
    /// Advisory notes about skipped categories and measurements.
    pub skipped: Vec<SkipNote>,
}

/// Scores the farm's latest state against configured ideal bands.
#[derive(Clone)]
pub struct HealthScorer {
    store: Arc<dyn SensorStore>,
    aggregator: Aggregator,
    bands: IdealBands,
}

impl HealthScorer {
    /// Bands are passed in explicitly so deployments can carry different
    /// configurations and tests stay deterministic.
    pub fn new(store: Arc<dyn SensorStore>, bands: IdealBands) -> Self {
        let aggregator = Aggregator::new(Arc::clone(&store));
        Self {
            store,
            aggregator,
            bands,
        }
    }

    /// Composite score from the latest reading of every sensor category.
    ///
    /// `as_of = None` scores against the latest available data; otherwise
    /// only partitions and readings at or before `as_of` are considered.
    /// The score ranges over `[-M, M]` where `M` is the number of evaluated
    /// measurements for this invocation.
    pub fn score(&self, as_of: Option<NaiveDateTime>) -> Result<HealthReport, StatError> {
        let mut report = HealthReport {
            score: 0,
            evaluated: 0,
            skipped: Vec::new(),
        };

        for sensor_type in SensorType::ALL {
            let Some(partition) = self.latest_partition(sensor_type, as_of)? else {
                report.skipped.push(SkipNote {
                    sensor_type,
                    reason: SkipReason::NoPartitions,
                });
                continue;
            };

            let Some(reading) = self.latest_reading(&partition, as_of)? else {
                report.skipped.push(SkipNote {
                    sensor_type,
                    reason: SkipReason::NoReadings { partition },
                });
                continue;
            };

            for (measurement, value) in &reading.data {
                match self.bands.get(measurement) {
                    Some(band) => {
                        report.evaluated += 1;
                        report.score += if band.contains(*value) { 1 } else { -1 };
                    }
                    None => report.skipped.push(SkipNote {
                        sensor_type,
                        reason: SkipReason::UnbandedMeasurement {
                            measurement: measurement.clone(),
                        },
                    }),
                }
            }
        }

        tracing::debug!(
            score = report.score,
            evaluated = report.evaluated,
            skipped = report.skipped.len(),
            "health score computed"
        );
        Ok(report)
    }

    /// Newest partition for a sensor type, bounded by `as_of`'s date.
    fn latest_partition(
        &self,
        sensor_type: SensorType,
        as_of: Option<NaiveDateTime>,
    ) -> Result<Option<String>, StatError> {
        match as_of {
            None => self.aggregator.latest_collection(sensor_type),
            Some(at) => {
                let partitions = self.store.list_partitions(sensor_type.key())?;
                Ok(partitions
                    .into_iter()
                    .filter(|p| partition_date(p).is_some_and(|d| d <= at.date()))
                    .next_back())
            }
        }
    }

    /// Newest reading of a partition, bounded by `as_of`.
    fn latest_reading(
        &self,
        partition: &str,
        as_of: Option<NaiveDateTime>,
    ) -> Result<Option<SensorReading>, StatError> {
        match as_of {
            None => self.aggregator.latest_reading(partition),
            Some(at) => {
                let mut readings = self.store.scan(partition, Some(SortBy::Timestamp))?;
                readings.retain(|r| r.timestamp <= at);
                Ok(readings.pop())
            }
        }
    }
}
