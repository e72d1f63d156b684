//! In-memory implementation of the partitioned store.
//!
//! Each partition is an append-only `Vec` behind its own lock, so writers to
//! different partitions never contend and readers of one partition see a
//! prefix of its true history.

use crate::store::{Reduce, SensorStore, SortBy, StoreError};
use crate::telemetry::SensorReading;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type PartitionHandle = Arc<RwLock<Vec<SensorReading>>>;

/// Process-local partitioned store.
#[derive(Default)]
pub struct MemoryStore {
    // BTreeMap keeps partition names sorted for prefix listing.
    partitions: RwLock<BTreeMap<String, PartitionHandle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for an existing partition, if any.
    fn partition(&self, partition_key: &str) -> Result<Option<PartitionHandle>, StoreError> {
        let map = self
            .partitions
            .read()
            .map_err(|_| StoreError::Backend("partition index lock poisoned".to_string()))?;
        Ok(map.get(partition_key).cloned())
    }

    /// Handle for a partition, creating it on first use.
    fn partition_or_create(&self, partition_key: &str) -> Result<PartitionHandle, StoreError> {
        if let Some(handle) = self.partition(partition_key)? {
            return Ok(handle);
        }
        let mut map = self
            .partitions
            .write()
            .map_err(|_| StoreError::Backend("partition index lock poisoned".to_string()))?;
        Ok(map.entry(partition_key.to_string()).or_default().clone())
    }
}

impl SensorStore for MemoryStore {
    fn insert(&self, partition_key: &str, readings: Vec<SensorReading>) -> Result<(), StoreError> {
        if readings.is_empty() {
            return Ok(());
        }
        let handle = self.partition_or_create(partition_key)?;
        let mut records = handle
            .write()
            .map_err(|_| StoreError::Backend(format!("partition {partition_key} lock poisoned")))?;
        records.extend(readings);
        Ok(())
    }

    fn scan(
        &self,
        partition_key: &str,
        sort: Option<SortBy>,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let Some(handle) = self.partition(partition_key)? else {
            return Ok(Vec::new());
        };
        let mut readings = handle
            .read()
            .map_err(|_| StoreError::Backend(format!("partition {partition_key} lock poisoned")))?
            .clone();

        match sort {
            None => {}
            Some(SortBy::Timestamp) => readings.sort_by_key(|r| r.timestamp),
            Some(SortBy::Measurement(key)) => readings.sort_by(|a, b| {
                let a = a.data.get(&key).copied().unwrap_or(f64::NEG_INFINITY);
                let b = b.data.get(&key).copied().unwrap_or(f64::NEG_INFINITY);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }),
        }
        Ok(readings)
    }

    fn count(&self, partition_key: &str) -> Result<u64, StoreError> {
        let Some(handle) = self.partition(partition_key)? else {
            return Ok(0);
        };
        let records = handle
            .read()
            .map_err(|_| StoreError::Backend(format!("partition {partition_key} lock poisoned")))?;
        Ok(records.len() as u64)
    }

    fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let map = self
            .partitions
            .read()
            .map_err(|_| StoreError::Backend("partition index lock poisoned".to_string()))?;
        Ok(map
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn reduce(
        &self,
        partition_key: &str,
        measurement: &str,
        op: Reduce,
    ) -> Result<Option<f64>, StoreError> {
        let Some(handle) = self.partition(partition_key)? else {
            return Ok(None);
        };
        let records = handle
            .read()
            .map_err(|_| StoreError::Backend(format!("partition {partition_key} lock poisoned")))?;

        let mut count = 0u64;
        let mut acc: Option<f64> = None;
        for value in records.iter().filter_map(|r| r.data.get(measurement)) {
            count += 1;
            acc = Some(match (op, acc) {
                (_, None) => *value,
                (Reduce::Average, Some(sum)) => sum + value,
                (Reduce::Highest, Some(best)) => best.max(*value),
                (Reduce::Lowest, Some(best)) => best.min(*value),
            });
        }

        Ok(match (op, acc) {
            (_, None) => None,
            (Reduce::Average, Some(sum)) => Some(sum / count as f64),
            (_, extreme) => extreme,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SensorType;
    use chrono::NaiveDate;

    fn reading(sensor_type: SensorType, second: u32, key: &str, value: f64) -> SensorReading {
        let timestamp = NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap();
        let mut data = std::collections::BTreeMap::new();
        data.insert(key.to_string(), value);
        SensorReading {
            metadata: sensor_type.metadata(),
            timestamp,
            data,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert(
                "co2-2023-03-08",
                vec![
                    reading(SensorType::Co2, 0, "co2", 400.0),
                    reading(SensorType::Co2, 1, "co2", 600.0),
                    reading(SensorType::Co2, 2, "co2", 500.0),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_unknown_partition_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.count("co2-2023-03-08").unwrap(), 0);
        assert!(store.scan("co2-2023-03-08", None).unwrap().is_empty());
        assert_eq!(
            store
                .reduce("co2-2023-03-08", "co2", Reduce::Average)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_insert_preserves_order() {
        let store = seeded();
        let readings = store.scan("co2-2023-03-08", None).unwrap();
        let values: Vec<f64> = readings.iter().map(|r| r.data["co2"]).collect();
        assert_eq!(values, vec![400.0, 600.0, 500.0]);
    }

    #[test]
    fn test_scan_sorted_by_measurement() {
        let store = seeded();
        let readings = store
            .scan(
                "co2-2023-03-08",
                Some(SortBy::Measurement("co2".to_string())),
            )
            .unwrap();
        let values: Vec<f64> = readings.iter().map(|r| r.data["co2"]).collect();
        assert_eq!(values, vec![400.0, 500.0, 600.0]);
    }

    #[test]
    fn test_reduce_operations() {
        let store = seeded();
        let key = "co2-2023-03-08";
        assert_eq!(store.reduce(key, "co2", Reduce::Average).unwrap(), Some(500.0));
        assert_eq!(store.reduce(key, "co2", Reduce::Highest).unwrap(), Some(600.0));
        assert_eq!(store.reduce(key, "co2", Reduce::Lowest).unwrap(), Some(400.0));
        assert_eq!(store.reduce(key, "humidity", Reduce::Average).unwrap(), None);
    }

    #[test]
    fn test_list_partitions_sorted_by_prefix() {
        let store = MemoryStore::new();
        for key in ["co2-2023-03-08", "co2-2023-02-24", "pH-2023-03-08"] {
            store
                .insert(key, vec![reading(SensorType::Co2, 0, "co2", 1.0)])
                .unwrap();
        }
        assert_eq!(
            store.list_partitions("co2").unwrap(),
            vec!["co2-2023-02-24".to_string(), "co2-2023-03-08".to_string()]
        );
        assert!(store.list_partitions("light").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_inserts_to_distinct_partitions() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for day in 1..=4u32 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let key = format!("co2-2023-03-{day:02}");
                for i in 0..50 {
                    store
                        .insert(&key, vec![reading(SensorType::Co2, i % 60, "co2", i as f64)])
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        for day in 1..=4u32 {
            assert_eq!(store.count(&format!("co2-2023-03-{day:02}")).unwrap(), 50);
        }
    }
}
