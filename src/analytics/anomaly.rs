//! Threshold anomaly detection over a day's partition.

use crate::analytics::aggregate::{Aggregator, StatError};
use crate::store::SensorStore;
use crate::telemetry::{partition_key, SensorReading, SensorType};
use chrono::NaiveDate;
use std::sync::Arc;

/// Default band half-width in standard deviations.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Flags readings that fall outside the mean ± k·stdev band of their
/// partition.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<dyn SensorStore>,
    aggregator: Aggregator,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        let aggregator = Aggregator::new(Arc::clone(&store));
        Self { store, aggregator }
    }

    /// Readings of `measurement` strictly outside `[mean - k·σ, mean + k·σ]`
    /// for the given sensor type and day, in partition order.
    ///
    /// A partition with fewer than two values cannot define the band, so the
    /// whole operation reports insufficient data rather than defaulting the
    /// bound to zero.
    pub fn detect(
        &self,
        sensor_type: SensorType,
        date: NaiveDate,
        measurement: &str,
        threshold: f64,
    ) -> Result<Vec<SensorReading>, StatError> {
        let partition = partition_key(sensor_type, date);

        let mean = self.aggregator.average(&partition, measurement)?;
        let stdev = self.aggregator.standard_deviation(&partition, measurement)?;

        let lower = mean - threshold * stdev;
        let upper = mean + threshold * stdev;

        let mut readings = self.store.scan(&partition, None)?;
        readings.retain(|r| {
            r.data
                .get(measurement)
                .is_some_and(|v| *v < lower || *v > upper)
        });

        tracing::debug!(
            partition = %partition,
            measurement,
            lower,
            upper,
            anomalies = readings.len(),
            "anomaly scan complete"
        );
        Ok(readings)
    }
}
