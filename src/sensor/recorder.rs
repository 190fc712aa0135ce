//! Per-sensor recorder: a driver plus a latest-value accumulator.

use crate::sensor::drivers::{SensorDriver, SensorError};
use crate::sensor::types::{SensorId, SensorSample};
use crossbeam_channel::Sender;

/// Owns one sensor's subscription and the in-memory accumulator it feeds.
///
/// The accumulator holds only the most recent reading per field. A reading
/// that arrives before the previous one was drained overwrites it, keeping
/// memory at O(1) per sensor; a reading arriving after a drain is reported
/// on the next tick.
pub struct SensorRecorder {
    id: SensorId,
    fields: Vec<String>,
    driver: Box<dyn SensorDriver>,
    accumulator: Vec<f64>,
}

impl SensorRecorder {
    pub fn new(id: SensorId, fields: Vec<String>, driver: Box<dyn SensorDriver>) -> Self {
        let accumulator = vec![0.0; fields.len()];
        Self {
            id,
            fields,
            driver,
            accumulator,
        }
    }

    pub fn id(&self) -> &SensorId {
        &self.id
    }

    /// CSV field names contributed by this recorder, in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Subscribe to the underlying sensor stream.
    pub fn start(&mut self, tx: Sender<SensorSample>) -> Result<(), SensorError> {
        self.driver.start(tx)
    }

    /// Unsubscribe from the underlying sensor stream.
    pub fn stop(&mut self) {
        self.driver.stop();
    }

    /// Overwrite the accumulator with the latest reading.
    ///
    /// Extra values beyond the field count are ignored; short readings
    /// leave the remaining fields untouched.
    pub fn apply_sample(&mut self, values: &[f64]) {
        for (slot, value) in self.accumulator.iter_mut().zip(values) {
            *slot = *value;
        }
    }

    /// Atomically return the accumulated values and clear them.
    ///
    /// Calling twice with no intervening sample yields zeros the second
    /// time (idempotent drain).
    pub fn read_and_reset(&mut self) -> Vec<f64> {
        let values = self.accumulator.clone();
        for slot in self.accumulator.iter_mut() {
            *slot = 0.0;
        }
        values
    }
}

/// Format a value for a CSV cell: integral values print without a decimal
/// point, matching the device's original output.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::drivers::WaveformDriver;
    use std::time::Duration;

    fn test_recorder() -> SensorRecorder {
        let driver = WaveformDriver::new(SensorId::HeartRate, Duration::from_secs(60), |_| {
            vec![0.0]
        });
        SensorRecorder::new(
            SensorId::HeartRate,
            vec!["Heartrate".to_string()],
            Box::new(driver),
        )
    }

    #[test]
    fn test_read_and_reset_returns_latest() {
        let mut recorder = test_recorder();
        recorder.apply_sample(&[60.0]);
        recorder.apply_sample(&[62.0]);
        assert_eq!(recorder.read_and_reset(), vec![62.0]);
    }

    #[test]
    fn test_read_and_reset_idempotent_drain() {
        let mut recorder = test_recorder();
        recorder.apply_sample(&[75.0]);
        assert_eq!(recorder.read_and_reset(), vec![75.0]);
        assert_eq!(recorder.read_and_reset(), vec![0.0]);
        assert_eq!(recorder.read_and_reset(), vec![0.0]);
    }

    #[test]
    fn test_apply_sample_length_mismatch() {
        let driver = WaveformDriver::new(SensorId::Accel, Duration::from_secs(60), |_| vec![]);
        let mut recorder = SensorRecorder::new(
            SensorId::Accel,
            vec!["AccelX".into(), "AccelY".into(), "AccelZ".into()],
            Box::new(driver),
        );

        recorder.apply_sample(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(recorder.read_and_reset(), vec![1.0, 2.0, 3.0]);

        recorder.apply_sample(&[5.0]);
        assert_eq!(recorder.read_and_reset(), vec![5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(60.0), "60");
        assert_eq!(format_value(-3.0), "-3");
        assert_eq!(format_value(21.5), "21.5");
        assert_eq!(format_value(0.0), "0");
    }
}
