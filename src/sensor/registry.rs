//! Recorder registry: ordered map of sensor plugins.
//!
//! Plugins are registered once at process initialization; registration
//! order is stable and defines CSV column order across ticks. External
//! integrations add sensors by registering a [`SensorPlugin`] capability
//! record, there is no runtime code loading.

use crate::sensor::drivers::{simulated_driver, SensorDriver};
use crate::sensor::recorder::SensorRecorder;
use crate::sensor::types::SensorId;

/// Capability record describing one pluggable sensor.
pub struct SensorPlugin {
    /// Identifier the configuration refers to
    pub id: SensorId,
    /// CSV field names contributed by the sensor, in column order
    pub fields: Vec<String>,
    /// Factory for the driver owning the sensor subscription
    pub make_driver: Box<dyn Fn() -> Box<dyn SensorDriver> + Send>,
}

impl SensorPlugin {
    pub fn new(
        id: SensorId,
        fields: Vec<&str>,
        make_driver: impl Fn() -> Box<dyn SensorDriver> + Send + 'static,
    ) -> Self {
        Self {
            id,
            fields: fields.into_iter().map(String::from).collect(),
            make_driver: Box::new(make_driver),
        }
    }
}

/// Registry of known sensor plugins, iterated in registration order.
pub struct RecorderRegistry {
    plugins: Vec<SensorPlugin>,
}

impl RecorderRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Registry pre-populated with the built-in accel/hrm/baro plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (id, fields) in [
            (SensorId::Accel, vec!["AccelX", "AccelY", "AccelZ"]),
            (SensorId::HeartRate, vec!["Heartrate"]),
            (SensorId::Baro, vec!["Temperature"]),
        ] {
            let driver_id = id.clone();
            registry.register(SensorPlugin::new(id, fields, move || {
                simulated_driver(&driver_id)
            }));
        }
        registry
    }

    /// Register a plugin. A plugin with an already-known id replaces the
    /// previous registration in place, keeping its column position.
    pub fn register(&mut self, plugin: SensorPlugin) {
        if let Some(existing) = self.plugins.iter_mut().find(|p| p.id == plugin.id) {
            log::warn!("Replacing previously registered sensor plugin '{}'", plugin.id);
            *existing = plugin;
        } else {
            self.plugins.push(plugin);
        }
    }

    /// Instantiate a fresh recorder for each enabled id with a known
    /// plugin, in registration order. Enabled ids without a plugin are
    /// skipped and logged, never fatal.
    pub fn build_active(&self, enabled: &[SensorId]) -> Vec<SensorRecorder> {
        for id in enabled {
            if !self.plugins.iter().any(|p| p.id == *id) {
                log::warn!("No sensor plugin registered for enabled id '{id}', skipping");
            }
        }

        self.plugins
            .iter()
            .filter(|p| enabled.contains(&p.id))
            .map(|p| SensorRecorder::new(p.id.clone(), p.fields.clone(), (p.make_driver)()))
            .collect()
    }

    /// Ids of all registered plugins, in registration order.
    pub fn known_ids(&self) -> Vec<SensorId> {
        self.plugins.iter().map(|p| p.id.clone()).collect()
    }
}

impl Default for RecorderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// CSV header fields for a set of active recorders: `Time` followed by
/// every recorder's fields in registry iteration order.
pub fn csv_header(recorders: &[SensorRecorder]) -> Vec<String> {
    let mut header = vec!["Time".to_string()];
    for recorder in recorders {
        header.extend(recorder.fields().iter().cloned());
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_active_registration_order() {
        let registry = RecorderRegistry::with_builtins();

        // Enabled order does not matter, registration order does.
        let recorders = registry.build_active(&[SensorId::Baro, SensorId::Accel]);
        assert_eq!(recorders.len(), 2);
        assert_eq!(*recorders[0].id(), SensorId::Accel);
        assert_eq!(*recorders[1].id(), SensorId::Baro);
    }

    #[test]
    fn test_build_active_skips_unknown_ids() {
        let registry = RecorderRegistry::with_builtins();
        let recorders =
            registry.build_active(&[SensorId::HeartRate, SensorId::Custom("gps".into())]);
        assert_eq!(recorders.len(), 1);
        assert_eq!(*recorders[0].id(), SensorId::HeartRate);
    }

    #[test]
    fn test_register_replaces_same_id_in_place() {
        let mut registry = RecorderRegistry::with_builtins();
        registry.register(SensorPlugin::new(
            SensorId::HeartRate,
            vec!["Bpm"],
            || simulated_driver(&SensorId::HeartRate),
        ));

        assert_eq!(
            registry.known_ids(),
            vec![SensorId::Accel, SensorId::HeartRate, SensorId::Baro]
        );
        let recorders = registry.build_active(&[SensorId::HeartRate]);
        assert_eq!(recorders[0].fields(), &["Bpm".to_string()]);
    }

    #[test]
    fn test_csv_header_order() {
        let registry = RecorderRegistry::with_builtins();
        let recorders = registry.build_active(&[
            SensorId::Accel,
            SensorId::HeartRate,
            SensorId::Baro,
        ]);
        assert_eq!(
            csv_header(&recorders),
            vec!["Time", "AccelX", "AccelY", "AccelZ", "Heartrate", "Temperature"]
        );
    }
}
