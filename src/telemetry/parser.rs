//! Table-driven parser turning raw telemetry lines into typed readings.
//!
//! A line must carry a `YYYY-MM-DD, HH:MM:SS` timestamp somewhere; the rest
//! of it is matched against each sensor grammar in [`SensorType::ALL`] order
//! and the first match wins. Lines that fail either step are dropped with an
//! explicit reason so the ingestion pipeline can count them instead of
//! swallowing errors.

use crate::telemetry::types::{ParsedReading, SensorReading, SensorType};
use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;

/// Timestamp substring shared by every sensor grammar.
const TIMESTAMP_PATTERN: &str = r"(\d{4}-\d{2}-\d{2}, \d{2}:\d{2}:\d{2})";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d, %H:%M:%S";

/// Why a line produced no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// No timestamp substring anywhere on the line.
    MissingTimestamp,
    /// Timestamp substring present but not a valid calendar datetime.
    MalformedTimestamp,
    /// No sensor grammar matched, or a captured value was not a finite number.
    NoGrammarMatch,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingTimestamp => write!(f, "missing timestamp"),
            DropReason::MalformedTimestamp => write!(f, "malformed timestamp"),
            DropReason::NoGrammarMatch => write!(f, "no matching sensor grammar"),
        }
    }
}

/// Errors raised while building the parser's schema table.
#[derive(Debug)]
pub enum ParserError {
    /// A grammar failed to compile.
    InvalidPattern { sensor: SensorType, message: String },
    /// A grammar's capture count disagrees with its declared measurement keys.
    KeyMismatch {
        sensor: SensorType,
        captures: usize,
        keys: usize,
    },
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::InvalidPattern { sensor, message } => {
                write!(f, "invalid grammar for {sensor}: {message}")
            }
            ParserError::KeyMismatch {
                sensor,
                captures,
                keys,
            } => write!(
                f,
                "grammar for {sensor} has {captures} capture(s) but {keys} measurement key(s)"
            ),
        }
    }
}

impl std::error::Error for ParserError {}

/// One validated entry of the schema table.
struct Schema {
    sensor_type: SensorType,
    grammar: Regex,
}

/// Table-driven line parser over the fixed sensor grammars.
///
/// Construction compiles and validates every grammar up front, so `parse` is
/// a pure function of the input line and the static table.
pub struct Parser {
    timestamp: Regex,
    schemas: Vec<Schema>,
}

impl Parser {
    /// Build the parser, validating every sensor grammar against its
    /// declared measurement keys.
    pub fn new() -> Result<Self, ParserError> {
        let timestamp = Regex::new(TIMESTAMP_PATTERN).map_err(|e| ParserError::InvalidPattern {
            sensor: SensorType::TemperatureHumidity,
            message: e.to_string(),
        })?;

        let mut schemas = Vec::with_capacity(SensorType::ALL.len());
        for sensor_type in SensorType::ALL {
            let grammar =
                Regex::new(sensor_type.pattern()).map_err(|e| ParserError::InvalidPattern {
                    sensor: sensor_type,
                    message: e.to_string(),
                })?;

            let captures = grammar.captures_len() - 1;
            let keys = sensor_type.measurement_keys().len();
            if captures != keys {
                return Err(ParserError::KeyMismatch {
                    sensor: sensor_type,
                    captures,
                    keys,
                });
            }

            schemas.push(Schema {
                sensor_type,
                grammar,
            });
        }

        Ok(Self { timestamp, schemas })
    }

    /// Parse one raw line into a typed reading, or report why it was dropped.
    pub fn parse(&self, line: &str) -> Result<ParsedReading, DropReason> {
        let ts_match = self
            .timestamp
            .captures(line)
            .and_then(|c| c.get(1))
            .ok_or(DropReason::MissingTimestamp)?;

        let timestamp = NaiveDateTime::parse_from_str(ts_match.as_str(), TIMESTAMP_FORMAT)
            .map_err(|_| DropReason::MalformedTimestamp)?;

        for schema in &self.schemas {
            let Some(captures) = schema.grammar.captures(line) else {
                continue;
            };

            let keys = schema.sensor_type.measurement_keys();
            let mut data = std::collections::BTreeMap::new();
            for (key, capture) in keys.iter().zip(captures.iter().skip(1)) {
                let value = capture
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or(DropReason::NoGrammarMatch)?;
                data.insert((*key).to_string(), value);
            }

            return Ok(ParsedReading {
                sensor_type: schema.sensor_type,
                reading: SensorReading {
                    metadata: schema.sensor_type.metadata(),
                    timestamp,
                    data,
                },
            });
        }

        Err(DropReason::NoGrammarMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> Parser {
        Parser::new().expect("schema table should validate")
    }

    #[test]
    fn test_every_sensor_type_parses() {
        let lines = [
            (
                SensorType::TemperatureHumidity,
                "2023-03-08, 14:30:00 Temperature: 24.5, Humidity: 55.2",
                vec![("temperature", 24.5), ("humidity", 55.2)],
            ),
            (
                SensorType::Co2,
                "2023-03-08, 14:30:05 CO2: 412",
                vec![("co2", 412.0)],
            ),
            (
                SensorType::Light,
                "2023-03-08, 14:30:10 Red: 120, Green: 200, Blue: 80, Clear: 400",
                vec![
                    ("Red", 120.0),
                    ("Green", 200.0),
                    ("Blue", 80.0),
                    ("Clear", 400.0),
                ],
            ),
            (
                SensorType::Ph,
                "2023-03-08, 14:30:15 pH: 6",
                vec![("pH", 6.0)],
            ),
            (
                SensorType::Conductivity,
                "2023-03-08, 14:30:20 EC: 1500",
                vec![("EC", 1500.0)],
            ),
            (
                SensorType::O2,
                "2023-03-08, 14:30:25 O2: 45",
                vec![("o2", 45.0)],
            ),
        ];

        let parser = parser();
        for (expected_type, line, expected_data) in lines {
            let parsed = parser.parse(line).expect("line should parse");
            assert_eq!(parsed.sensor_type, expected_type, "line: {line}");
            for (key, value) in expected_data {
                assert_eq!(parsed.reading.data.get(key), Some(&value), "key: {key}");
            }
            assert_eq!(
                parsed.reading.data.len(),
                expected_type.measurement_keys().len()
            );
        }
    }

    #[test]
    fn test_missing_timestamp_dropped() {
        let result = parser().parse("Temperature: 24.5, Humidity: 55.2");
        assert_eq!(result.unwrap_err(), DropReason::MissingTimestamp);
    }

    #[test]
    fn test_malformed_timestamp_dropped() {
        let result = parser().parse("2023-13-40, 25:99:99 CO2: 412");
        assert_eq!(result.unwrap_err(), DropReason::MalformedTimestamp);
    }

    #[test]
    fn test_unmatched_grammar_dropped() {
        let result = parser().parse("2023-03-08, 14:30:00 Lux: 900");
        assert_eq!(result.unwrap_err(), DropReason::NoGrammarMatch);
    }

    #[test]
    fn test_co2_wins_over_o2() {
        // `O2: (\d+)` also matches inside "CO2: 412"; table order decides.
        let parsed = parser().parse("2023-03-08, 14:30:05 CO2: 412").unwrap();
        assert_eq!(parsed.sensor_type, SensorType::Co2);
        assert_eq!(parsed.reading.data.get("co2"), Some(&412.0));
    }

    #[test]
    fn test_metadata_attached() {
        let parsed = parser().parse("2023-03-08, 14:30:15 pH: 6").unwrap();
        assert_eq!(parsed.reading.metadata.device, "Arduino-MKR-1010-B");
    }

    #[test]
    fn test_partition_key_from_parsed_line() {
        let parsed = parser().parse("2023-03-08, 14:30:20 EC: 1500").unwrap();
        assert_eq!(parsed.partition_key(), "conductivity-2023-03-08");
    }
}
