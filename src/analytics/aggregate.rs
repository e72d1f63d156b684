//! Per-partition statistics over the store's read primitives.
//!
//! Every operation takes a partition key (and usually a measurement name) and
//! returns an explicit insufficient-data error when its precondition is not
//! met, never a defaulted zero and never a panic. The aggregator only ever
//! talks to [`SensorStore`]'s four read primitives, so it is oblivious to the
//! backing store.

use crate::store::{Reduce, SensorStore, SortBy, StoreError};
use crate::telemetry::{SensorReading, SensorType};
use chrono::NaiveDateTime;
use statrs::statistics::Statistics;
use std::fmt;
use std::sync::Arc;

/// Percentile set reported when the caller does not name one.
pub const DEFAULT_PERCENTILES: [u8; 4] = [25, 50, 75, 90];

/// Statistics errors.
#[derive(Debug)]
pub enum StatError {
    /// The partition holds fewer matching values than the statistic needs.
    InsufficientData {
        partition: String,
        required: u64,
        available: u64,
    },
    /// The underlying store failed.
    Store(StoreError),
}

impl fmt::Display for StatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatError::InsufficientData {
                partition,
                required,
                available,
            } => write!(
                f,
                "insufficient data in partition {partition}: need {required} value(s), have {available}"
            ),
            StatError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for StatError {}

impl From<StoreError> for StatError {
    fn from(e: StoreError) -> Self {
        StatError::Store(e)
    }
}

/// Structured reading filter; a reading matches when every condition holds.
#[derive(Debug, Clone)]
pub enum Condition {
    /// The named measurement equals `value` exactly.
    MeasurementEq { key: String, value: f64 },
    /// The named measurement lies within the inclusive bounds that are set.
    MeasurementRange {
        key: String,
        low: Option<f64>,
        high: Option<f64>,
    },
    /// The timestamp lies within the inclusive bounds that are set.
    TimestampRange {
        after: Option<NaiveDateTime>,
        before: Option<NaiveDateTime>,
    },
}

impl Condition {
    fn matches(&self, reading: &SensorReading) -> bool {
        match self {
            Condition::MeasurementEq { key, value } => {
                reading.data.get(key).is_some_and(|v| v == value)
            }
            Condition::MeasurementRange { key, low, high } => {
                reading.data.get(key).is_some_and(|v| {
                    low.map_or(true, |lo| *v >= lo) && high.map_or(true, |hi| *v <= hi)
                })
            }
            Condition::TimestampRange { after, before } => {
                after.map_or(true, |a| reading.timestamp >= a)
                    && before.map_or(true, |b| reading.timestamp <= b)
            }
        }
    }
}

/// Statistic engine over a [`SensorStore`].
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn SensorStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        Self { store }
    }

    /// Mean of a measurement across a partition.
    pub fn average(&self, partition_key: &str, measurement: &str) -> Result<f64, StatError> {
        self.reduced(partition_key, measurement, Reduce::Average)
    }

    /// Maximum of a measurement across a partition.
    pub fn highest(&self, partition_key: &str, measurement: &str) -> Result<f64, StatError> {
        self.reduced(partition_key, measurement, Reduce::Highest)
    }

    /// Minimum of a measurement across a partition.
    pub fn lowest(&self, partition_key: &str, measurement: &str) -> Result<f64, StatError> {
        self.reduced(partition_key, measurement, Reduce::Lowest)
    }

    /// Standard median; an even count averages the two middle values.
    pub fn median(&self, partition_key: &str, measurement: &str) -> Result<f64, StatError> {
        let values = self.sorted_values(partition_key, measurement)?;
        if values.is_empty() {
            return Err(self.insufficient(partition_key, 1, 0));
        }
        let n = values.len();
        Ok(if n % 2 == 0 {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        } else {
            values[n / 2]
        })
    }

    /// Most frequent value; ties break to the smallest value.
    pub fn mode(&self, partition_key: &str, measurement: &str) -> Result<f64, StatError> {
        let values = self.sorted_values(partition_key, measurement)?;
        if values.is_empty() {
            return Err(self.insufficient(partition_key, 1, 0));
        }

        // Run-length over the ascending values; a strictly larger count is
        // required to displace the current best, so the smallest value of a
        // tie wins.
        let mut best = (values[0], 0usize);
        let mut run = (values[0], 0usize);
        for value in values {
            if value == run.0 {
                run.1 += 1;
            } else {
                run = (value, 1);
            }
            if run.1 > best.1 {
                best = run;
            }
        }
        Ok(best.0)
    }

    /// Sample standard deviation; requires at least two values.
    pub fn standard_deviation(
        &self,
        partition_key: &str,
        measurement: &str,
    ) -> Result<f64, StatError> {
        let values = self.sorted_values(partition_key, measurement)?;
        if values.len() < 2 {
            return Err(self.insufficient(partition_key, 2, values.len() as u64));
        }
        Ok(values.iter().std_dev())
    }

    /// Nearest-rank percentiles without interpolation.
    ///
    /// For each requested percentile `p` the result is the sorted value at
    /// `floor(n * p / 100)`, clamped to the valid index range. This matches
    /// the historical reporting output and intentionally differs from the
    /// linear-interpolation method.
    pub fn percentiles(
        &self,
        partition_key: &str,
        measurement: &str,
        percentiles: &[u8],
    ) -> Result<Vec<(u8, f64)>, StatError> {
        let values = self.sorted_values(partition_key, measurement)?;
        if values.is_empty() {
            return Err(self.insufficient(partition_key, 1, 0));
        }
        let n = values.len();
        Ok(percentiles
            .iter()
            .map(|&p| {
                let index = ((n as f64) * (f64::from(p) / 100.0)).floor() as usize;
                (p, values[index.min(n - 1)])
            })
            .collect())
    }

    /// Number of readings in a partition; zero is a valid answer.
    pub fn count(&self, partition_key: &str) -> Result<u64, StatError> {
        Ok(self.store.count(partition_key)?)
    }

    /// Readings per second over the partition's observed time span.
    pub fn rate(&self, partition_key: &str) -> Result<f64, StatError> {
        let readings = self.store.scan(partition_key, Some(SortBy::Timestamp))?;
        if readings.len() < 2 {
            return Err(self.insufficient(partition_key, 2, readings.len() as u64));
        }
        let first = readings[0].timestamp;
        let last = readings[readings.len() - 1].timestamp;
        let span_secs = (last - first).num_milliseconds() as f64 / 1000.0;
        if span_secs <= 0.0 {
            return Err(self.insufficient(partition_key, 2, readings.len() as u64));
        }
        Ok(readings.len() as f64 / span_secs)
    }

    /// Latest partition for a sensor type, or `None` if it never reported.
    pub fn latest_collection(
        &self,
        sensor_type: SensorType,
    ) -> Result<Option<String>, StatError> {
        let mut partitions = self.store.list_partitions(sensor_type.key())?;
        Ok(partitions.pop())
    }

    /// The reading with the greatest timestamp, or `None` for an empty
    /// partition.
    pub fn latest_reading(
        &self,
        partition_key: &str,
    ) -> Result<Option<SensorReading>, StatError> {
        let mut readings = self.store.scan(partition_key, Some(SortBy::Timestamp))?;
        Ok(readings.pop())
    }

    /// All readings matching every condition, in partition order.
    pub fn filter(
        &self,
        partition_key: &str,
        conditions: &[Condition],
    ) -> Result<Vec<SensorReading>, StatError> {
        let mut readings = self.store.scan(partition_key, None)?;
        readings.retain(|r| conditions.iter().all(|c| c.matches(r)));
        Ok(readings)
    }

    fn reduced(
        &self,
        partition_key: &str,
        measurement: &str,
        op: Reduce,
    ) -> Result<f64, StatError> {
        self.store
            .reduce(partition_key, measurement, op)?
            .ok_or_else(|| self.insufficient(partition_key, 1, 0))
    }

    /// The partition's values for one measurement, ascending.
    fn sorted_values(
        &self,
        partition_key: &str,
        measurement: &str,
    ) -> Result<Vec<f64>, StatError> {
        let readings = self
            .store
            .scan(partition_key, Some(SortBy::Measurement(measurement.to_string())))?;
        Ok(readings
            .iter()
            .filter_map(|r| r.data.get(measurement))
            .copied()
            .collect())
    }

    fn insufficient(&self, partition_key: &str, required: u64, available: u64) -> StatError {
        StatError::InsufficientData {
            partition: partition_key.to_string(),
            required,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::telemetry::SensorType;
    use chrono::NaiveDate;

    const PARTITION: &str = "co2-2023-03-08";

    fn reading(second: u32, value: f64) -> SensorReading {
        let timestamp = NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(i64::from(second));
        let mut data = std::collections::BTreeMap::new();
        data.insert("co2".to_string(), value);
        SensorReading {
            metadata: SensorType::Co2.metadata(),
            timestamp,
            data,
        }
    }

    fn aggregator_over(values: &[f64]) -> Aggregator {
        let store = MemoryStore::new();
        let readings = values
            .iter()
            .enumerate()
            .map(|(i, v)| reading(i as u32, *v))
            .collect();
        store.insert(PARTITION, readings).unwrap();
        Aggregator::new(Arc::new(store))
    }

    #[test]
    fn test_average_highest_lowest() {
        let agg = aggregator_over(&[400.0, 600.0, 500.0]);
        assert_eq!(agg.average(PARTITION, "co2").unwrap(), 500.0);
        assert_eq!(agg.highest(PARTITION, "co2").unwrap(), 600.0);
        assert_eq!(agg.lowest(PARTITION, "co2").unwrap(), 400.0);
    }

    #[test]
    fn test_average_on_empty_partition_is_insufficient() {
        let agg = aggregator_over(&[]);
        assert!(matches!(
            agg.average(PARTITION, "co2"),
            Err(StatError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_median_odd_and_even() {
        let agg = aggregator_over(&[30.0, 10.0, 20.0]);
        assert_eq!(agg.median(PARTITION, "co2").unwrap(), 20.0);

        let agg = aggregator_over(&[40.0, 10.0, 30.0, 20.0]);
        assert_eq!(agg.median(PARTITION, "co2").unwrap(), 25.0);
    }

    #[test]
    fn test_mode_tie_breaks_to_smallest() {
        let agg = aggregator_over(&[1.0, 1.0, 2.0, 2.0, 3.0]);
        assert_eq!(agg.mode(PARTITION, "co2").unwrap(), 1.0);
    }

    #[test]
    fn test_mode_prefers_higher_count() {
        let agg = aggregator_over(&[5.0, 2.0, 2.0, 2.0, 9.0, 9.0]);
        assert_eq!(agg.mode(PARTITION, "co2").unwrap(), 2.0);
    }

    #[test]
    fn test_standard_deviation_is_sample() {
        let agg = aggregator_over(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let sd = agg.standard_deviation(PARTITION, "co2").unwrap();
        // Sample stdev of this set is sqrt(32/7).
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_standard_deviation_needs_two_values() {
        let agg = aggregator_over(&[5.0]);
        assert!(matches!(
            agg.standard_deviation(PARTITION, "co2"),
            Err(StatError::InsufficientData { required: 2, .. })
        ));
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let agg = aggregator_over(&[10.0, 20.0, 30.0, 40.0]);
        let result = agg.percentiles(PARTITION, "co2", &[0, 50, 100]).unwrap();
        assert_eq!(result, vec![(0, 10.0), (50, 30.0), (100, 40.0)]);
    }

    #[test]
    fn test_count_zero_is_valid() {
        let agg = aggregator_over(&[]);
        assert_eq!(agg.count(PARTITION).unwrap(), 0);
    }

    #[test]
    fn test_rate_over_span() {
        // Readings at t=0s and t=10s: 2 readings over 10 seconds.
        let store = MemoryStore::new();
        store
            .insert(PARTITION, vec![reading(0, 400.0), reading(10, 500.0)])
            .unwrap();
        let agg = Aggregator::new(Arc::new(store));
        assert!((agg.rate(PARTITION).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_rate_insufficient_on_single_reading_or_zero_span() {
        let agg = aggregator_over(&[400.0]);
        assert!(matches!(
            agg.rate(PARTITION),
            Err(StatError::InsufficientData { .. })
        ));

        let store = MemoryStore::new();
        store
            .insert(PARTITION, vec![reading(5, 400.0), reading(5, 500.0)])
            .unwrap();
        let agg = Aggregator::new(Arc::new(store));
        assert!(matches!(
            agg.rate(PARTITION),
            Err(StatError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_latest_collection_and_reading() {
        let store = MemoryStore::new();
        store
            .insert("co2-2023-02-24", vec![reading(0, 350.0)])
            .unwrap();
        store
            .insert(PARTITION, vec![reading(0, 400.0), reading(30, 450.0)])
            .unwrap();
        let agg = Aggregator::new(Arc::new(store));

        assert_eq!(
            agg.latest_collection(SensorType::Co2).unwrap(),
            Some(PARTITION.to_string())
        );
        assert_eq!(agg.latest_collection(SensorType::Light).unwrap(), None);

        let latest = agg.latest_reading(PARTITION).unwrap().unwrap();
        assert_eq!(latest.data["co2"], 450.0);
        assert_eq!(agg.latest_reading("co2-2099-01-01").unwrap(), None);
    }

    #[test]
    fn test_filter_conditions() {
        let agg = aggregator_over(&[400.0, 600.0, 500.0]);

        let high = agg
            .filter(
                PARTITION,
                &[Condition::MeasurementRange {
                    key: "co2".to_string(),
                    low: Some(450.0),
                    high: None,
                }],
            )
            .unwrap();
        let values: Vec<f64> = high.iter().map(|r| r.data["co2"]).collect();
        assert_eq!(values, vec![600.0, 500.0]); // partition order preserved

        let exact = agg
            .filter(
                PARTITION,
                &[Condition::MeasurementEq {
                    key: "co2".to_string(),
                    value: 600.0,
                }],
            )
            .unwrap();
        assert_eq!(exact.len(), 1);

        let cutoff = NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(12, 0, 1)
            .unwrap();
        let early = agg
            .filter(
                PARTITION,
                &[Condition::TimestampRange {
                    after: None,
                    before: Some(cutoff),
                }],
            )
            .unwrap();
        assert_eq!(early.len(), 2);
    }
}
