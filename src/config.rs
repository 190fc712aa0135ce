//! Persisted recorder configuration.
//!
//! The configuration is the only state shared with the external menu/UI
//! collaborator. It tolerates missing keys (defaults are applied and
//! persisted back) and ignores unknown keys.

use crate::sensor::SensorId;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Recorder configuration, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sensors to record, by id
    #[serde(default = "default_enabled_sensors")]
    pub enabled_sensors: Vec<SensorId>,

    /// Seconds between samples (minimum 1)
    #[serde(default = "default_sample_period")]
    pub sample_period_secs: u32,

    /// Whether a recording session should be running
    #[serde(default)]
    pub is_recording: bool,

    /// Name of the log file the active session writes to
    #[serde(default)]
    pub active_file: Option<String>,

    /// Subject identifier embedded in log file names
    #[serde(default = "default_subject_id")]
    pub subject_id: String,

    /// Hours to add to UTC when deciding the local day
    #[serde(default)]
    pub locale_offset_hours: i32,

    /// `host:port` of the file relay link, if any
    #[serde(default)]
    pub transfer_target: Option<String>,

    /// Directory holding the CSV log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_enabled_sensors() -> Vec<SensorId> {
    vec![SensorId::Accel, SensorId::Baro, SensorId::HeartRate]
}

fn default_sample_period() -> u32 {
    1
}

fn default_subject_id() -> String {
    "00".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clinirec")
        .join("logs")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_sensors: default_enabled_sensors(),
            sample_period_secs: default_sample_period(),
            is_recording: false,
            active_file: None,
            subject_id: default_subject_id(),
            locale_offset_hours: 0,
            transfer_target: None,
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, applying defaults when the
    /// file is missing and clamping out-of-range values.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            Self::default()
        };

        config.sample_period_secs = config.sample_period_secs.max(1);
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Path of the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clinirec")
            .join("config.json")
    }

    /// Ensure the log directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// The configured local-time offset.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.locale_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Local calendar date for a UTC instant under the configured offset.
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.local_offset()).date_naive()
    }

    /// Log file name for the given local date: `<subject>_<YYYY-MM-DD>.csv`.
    pub fn file_name_for(&self, date: NaiveDate) -> String {
        format!("{}_{}.csv", self.subject_id, date.format("%Y-%m-%d"))
    }

    /// Whether `name` is consistent with the subject id and the local date
    /// of `utc` (numbered collision suffixes included).
    pub fn file_is_current(&self, name: &str, utc: DateTime<Utc>) -> bool {
        let prefix = format!(
            "{}_{}",
            self.subject_id,
            self.local_date(utc).format("%Y-%m-%d")
        );
        name.starts_with(&prefix) && name.ends_with(".csv")
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
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sample_period_secs, 1);
        assert!(!config.is_recording);
        assert_eq!(config.subject_id, "00");
        assert_eq!(
            config.enabled_sensors,
            vec![SensorId::Accel, SensorId::Baro, SensorId::HeartRate]
        );
    }

    #[test]
    fn test_missing_keys_get_defaults() {
        let config: Config = serde_json::from_str(r#"{"subject_id": "05"}"#).unwrap();
        assert_eq!(config.subject_id, "05");
        assert_eq!(config.sample_period_secs, 1);
        assert_eq!(config.enabled_sensors.len(), 3);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config: Config =
            serde_json::from_str(r#"{"subject_id": "05", "widget_area": "tl"}"#).unwrap();
        assert_eq!(config.subject_id, "05");
    }

    #[test]
    fn test_load_clamps_period() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sample_period_secs": 0}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sample_period_secs, 1);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.subject_id = "05".to_string();
        config.enabled_sensors = vec![SensorId::HeartRate];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.subject_id, "05");
        assert_eq!(loaded.enabled_sensors, vec![SensorId::HeartRate]);
    }

    #[test]
    fn test_local_date_respects_offset() {
        let mut config = Config::default();
        config.locale_offset_hours = 2;

        let utc = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(
            config.local_date(utc),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_file_is_current() {
        let mut config = Config::default();
        config.subject_id = "05".to_string();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        assert!(config.file_is_current("05_2024-03-01.csv", utc));
        assert!(config.file_is_current("05_2024-03-01_1.csv", utc));
        assert!(!config.file_is_current("05_2024-02-29.csv", utc));
        assert!(!config.file_is_current("06_2024-03-01.csv", utc));
    }
}
