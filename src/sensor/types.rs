//! Sensor identifiers and sample events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a sensor data source.
///
/// The built-in set matches the recorders the device ships with; `Custom`
/// covers externally registered plugin sensors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorId {
    /// Three-axis accelerometer
    Accel,
    /// Heart-rate monitor
    HeartRate,
    /// Barometer (temperature channel)
    Baro,
    /// Externally registered sensor plugin
    Custom(String),
}

impl SensorId {
    /// The persisted string form of this id.
    pub fn as_str(&self) -> &str {
        match self {
            SensorId::Accel => "accel",
            SensorId::HeartRate => "hrm",
            SensorId::Baro => "baro",
            SensorId::Custom(id) => id,
        }
    }
}

impl From<String> for SensorId {
    fn from(s: String) -> Self {
        match s.as_str() {
            "accel" => SensorId::Accel,
            "hrm" => SensorId::HeartRate,
            "baro" => SensorId::Baro,
            _ => SensorId::Custom(s),
        }
    }
}

impl From<&str> for SensorId {
    fn from(s: &str) -> Self {
        SensorId::from(s.to_string())
    }
}

impl From<SensorId> for String {
    fn from(id: SensorId) -> Self {
        id.as_str().to_string()
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reading delivered by a sensor driver.
///
/// Values are ordered to match the owning recorder's CSV field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSample {
    /// Which sensor produced the reading
    pub id: SensorId,
    /// One value per CSV field of the sensor
    pub values: Vec<f64>,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    pub fn new(id: SensorId, values: Vec<f64>) -> Self {
        Self {
            id,
            values,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_id_roundtrip() {
        for name in ["accel", "hrm", "baro"] {
            let id = SensorId::from(name);
            assert_eq!(id.as_str(), name);
            assert!(!matches!(id, SensorId::Custom(_)));
        }
    }

    #[test]
    fn test_custom_id_roundtrip() {
        let id = SensorId::from("gps");
        assert_eq!(id, SensorId::Custom("gps".to_string()));
        assert_eq!(String::from(id), "gps");
    }

    #[test]
    fn test_id_serde_as_string() {
        let json = serde_json::to_string(&SensorId::HeartRate).unwrap();
        assert_eq!(json, "\"hrm\"");
        let back: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SensorId::HeartRate);
    }

    #[test]
    fn test_sample_creation() {
        let sample = SensorSample::new(SensorId::Accel, vec![0.1, 0.2, 0.3]);
        assert_eq!(sample.id, SensorId::Accel);
        assert_eq!(sample.values.len(), 3);
    }
}
