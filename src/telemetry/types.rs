//! Typed sensor readings and the static sensor schema table.
//!
//! Every sensor the farm emits is described by one [`SensorType`] variant:
//! its line grammar, its device metadata, and the ordered list of measurement
//! keys the grammar captures. New sensors are added by extending the enum,
//! not by mutating a runtime table.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed set of sensor types the agent recognizes.
///
/// Declaration order matters: the parser tries grammars in this order and the
/// first match wins. `Co2` must stay ahead of `O2` because `O2: (\d+)` would
/// otherwise match inside a `CO2: 412` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    TemperatureHumidity,
    Co2,
    Light,
    Ph,
    Conductivity,
    O2,
}

impl SensorType {
    /// All sensor types in grammar-matching order.
    pub const ALL: [SensorType; 6] = [
        SensorType::TemperatureHumidity,
        SensorType::Co2,
        SensorType::Light,
        SensorType::Ph,
        SensorType::Conductivity,
        SensorType::O2,
    ];

    /// Stable identifier used as the partition-name prefix.
    pub fn key(&self) -> &'static str {
        match self {
            SensorType::TemperatureHumidity => "temperature-humidity",
            SensorType::Co2 => "co2",
            SensorType::Light => "light",
            SensorType::Ph => "pH",
            SensorType::Conductivity => "conductivity",
            SensorType::O2 => "o2",
        }
    }

    /// Measurement grammar for this sensor's line format.
    pub fn pattern(&self) -> &'static str {
        match self {
            SensorType::TemperatureHumidity => {
                r"Temperature: (\d+\.\d+), Humidity: (\d+\.\d+)"
            }
            SensorType::Co2 => r"CO2: (\d+)",
            SensorType::Light => r"Red: (\d+), Green: (\d+), Blue: (\d+), Clear: (\d+)",
            SensorType::Ph => r"pH: (\d+)",
            SensorType::Conductivity => r"EC: (\d+)",
            SensorType::O2 => r"O2: (\d+)",
        }
    }

    /// Named measurement keys, in capture-group order.
    pub fn measurement_keys(&self) -> &'static [&'static str] {
        match self {
            SensorType::TemperatureHumidity => &["temperature", "humidity"],
            SensorType::Co2 => &["co2"],
            SensorType::Light => &["Red", "Green", "Blue", "Clear"],
            SensorType::Ph => &["pH"],
            SensorType::Conductivity => &["EC"],
            SensorType::O2 => &["o2"],
        }
    }

    /// Device metadata attached to every reading of this type.
    pub fn metadata(&self) -> SensorMetadata {
        let (sensor, device) = match self {
            SensorType::TemperatureHumidity => ("DHT22", "Arduino-MKR-1010-A"),
            SensorType::Co2 => ("SCD40", "Arduino-MKR-1010-A"),
            SensorType::Light => ("TCS34725", "Arduino-MKR-1010-A"),
            SensorType::Ph => ("Atlas-Scientific-Gravity-pH", "Arduino-MKR-1010-B"),
            SensorType::Conductivity => {
                ("Atlas-Scientific-Conductivity", "Arduino-MKR-1010-B")
            }
            SensorType::O2 => ("Atlas-Scientific-Gravity-O2", "Arduino-MKR-1010-B"),
        };
        SensorMetadata {
            sensor: sensor.to_string(),
            device: device.to_string(),
        }
    }

    /// Look up a sensor type by its stable identifier.
    pub fn from_key(key: &str) -> Option<SensorType> {
        SensorType::ALL.iter().copied().find(|t| t.key() == key)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Sensor model and device identifiers carried on every reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMetadata {
    pub sensor: String,
    pub device: String,
}

/// One parsed measurement event.
///
/// Created once by the parser and never mutated afterwards; once persisted it
/// is read-only history. Every key in `data` is drawn from the owning
/// [`SensorType`]'s declared measurement keys and every value is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub metadata: SensorMetadata,
    pub timestamp: NaiveDateTime,
    pub data: BTreeMap<String, f64>,
}

/// A reading together with the sensor type that produced it.
///
/// The persisted record is just the [`SensorReading`]; the sensor type is
/// encoded in the partition name, so it rides alongside only until the
/// reading has been routed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub sensor_type: SensorType,
    pub reading: SensorReading,
}

impl ParsedReading {
    /// Partition this reading belongs to, determined entirely by its own
    /// sensor type and calendar date.
    pub fn partition_key(&self) -> String {
        partition_key(self.sensor_type, self.reading.timestamp.date())
    }
}

/// Partition name for a sensor type and calendar day.
///
/// The `{sensor_type}-{YYYY-MM-DD}` form is zero-padded so partition names
/// sort lexicographically in chronological order; the latest partition for a
/// prefix is the lexicographic maximum.
pub fn partition_key(sensor_type: SensorType, date: NaiveDate) -> String {
    format!("{}-{}", sensor_type.key(), date.format("%Y-%m-%d"))
}

/// Recover the calendar date from a partition name.
pub fn partition_date(key: &str) -> Option<NaiveDate> {
    if key.len() < 10 {
        return None;
    }
    NaiveDate::parse_from_str(&key[key.len() - 10..], "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_deterministic() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 8).unwrap();
        let a = partition_key(SensorType::Co2, date);
        let b = partition_key(SensorType::Co2, date);
        assert_eq!(a, b);
        assert_eq!(a, "co2-2023-03-08");
    }

    #[test]
    fn test_same_day_same_partition() {
        let morning = NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(6, 15, 0)
            .unwrap();
        let evening = NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(21, 45, 9)
            .unwrap();
        assert_eq!(
            partition_key(SensorType::Ph, morning.date()),
            partition_key(SensorType::Ph, evening.date())
        );
    }

    #[test]
    fn test_partition_names_sort_chronologically() {
        let d1 = NaiveDate::from_ymd_opt(2023, 2, 28).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let k1 = partition_key(SensorType::Light, d1);
        let k2 = partition_key(SensorType::Light, d2);
        let k3 = partition_key(SensorType::Light, d3);
        assert!(k1 < k2);
        assert!(k2 < k3);
    }

    #[test]
    fn test_partition_date_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 8).unwrap();
        let key = partition_key(SensorType::TemperatureHumidity, date);
        assert_eq!(partition_date(&key), Some(date));
        assert_eq!(partition_date("junk"), None);
    }

    #[test]
    fn test_sensor_type_keys_roundtrip() {
        for sensor_type in SensorType::ALL {
            assert_eq!(SensorType::from_key(sensor_type.key()), Some(sensor_type));
        }
        assert_eq!(SensorType::from_key("barometer"), None);
    }

    #[test]
    fn test_co2_ordered_before_o2() {
        let co2_pos = SensorType::ALL
            .iter()
            .position(|t| *t == SensorType::Co2)
            .unwrap();
        let o2_pos = SensorType::ALL
            .iter()
            .position(|t| *t == SensorType::O2)
            .unwrap();
        assert!(co2_pos < o2_pos);
    }
}
