//! Pluggable sensor recorders.
//!
//! A [`SensorPlugin`] capability record ties a [`SensorId`] to its CSV
//! fields and a driver factory; the [`RecorderRegistry`] instantiates one
//! [`SensorRecorder`] per enabled sensor at session start.

pub mod drivers;
pub mod recorder;
pub mod registry;
pub mod types;

pub use drivers::{simulated_driver, SensorDriver, SensorError, WaveformDriver};
pub use recorder::{format_value, SensorRecorder};
pub use registry::{csv_header, RecorderRegistry, SensorPlugin};
pub use types::{SensorId, SensorSample};
