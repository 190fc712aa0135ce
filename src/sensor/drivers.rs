//! Sensor drivers: the subscription side of a recorder.
//!
//! A driver owns the connection to a physical (or simulated) sensor and
//! pushes readings into the session's sample channel. The built-in drivers
//! here are waveform simulators so the binary runs on hosts without the
//! target device's sensor buses; hardware integrations register real
//! drivers through the same [`SensorPlugin`](crate::sensor::SensorPlugin)
//! capability record.

use crate::sensor::types::{SensorId, SensorSample};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Errors that can occur while starting or running a sensor driver.
#[derive(Debug)]
pub enum SensorError {
    /// The driver's subscription is already active
    AlreadyRunning,
    /// Driver-specific failure (bus error, missing hardware, ...)
    Driver(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::AlreadyRunning => write!(f, "Sensor driver is already running"),
            SensorError::Driver(msg) => write!(f, "Sensor driver error: {msg}"),
        }
    }
}

impl std::error::Error for SensorError {}

/// Subscription to an underlying sensor event stream.
///
/// `start` begins delivering [`SensorSample`]s on the provided channel until
/// `stop` is called. Both must be idempotent enough to survive a stop
/// without a prior successful start.
pub trait SensorDriver: Send {
    fn start(&mut self, tx: Sender<SensorSample>) -> Result<(), SensorError>;
    fn stop(&mut self);
}

/// A simulated driver that emits samples from a waveform function on a
/// background thread.
pub struct WaveformDriver {
    id: SensorId,
    interval: Duration,
    waveform: fn(u64) -> Vec<f64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WaveformDriver {
    pub fn new(id: SensorId, interval: Duration, waveform: fn(u64) -> Vec<f64>) -> Self {
        Self {
            id,
            interval,
            waveform,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl SensorDriver for WaveformDriver {
    fn start(&mut self, tx: Sender<SensorSample>) -> Result<(), SensorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SensorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let id = self.id.clone();
        let interval = self.interval;
        let waveform = self.waveform;

        self.handle = Some(std::thread::spawn(move || {
            let mut n: u64 = 0;
            while running.load(Ordering::SeqCst) {
                // Drop the sample if the session is not draining the channel.
                let _ = tx.try_send(SensorSample::new(id.clone(), waveform(n)));
                n = n.wrapping_add(1);
                std::thread::sleep(interval);
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WaveformDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accel_waveform(n: u64) -> Vec<f64> {
    let t = n as f64 * 0.25;
    vec![t.sin() * 0.02, t.cos() * 0.02, 1.0 + (t * 0.5).sin() * 0.01]
}

fn hrm_waveform(n: u64) -> Vec<f64> {
    vec![68.0 + ((n as f64) * 0.1).sin() * 6.0]
}

fn baro_waveform(n: u64) -> Vec<f64> {
    vec![21.5 + ((n as f64) * 0.02).sin() * 0.5]
}

/// Build a simulated driver for one of the built-in sensor ids.
pub fn simulated_driver(id: &SensorId) -> Box<dyn SensorDriver> {
    let interval = Duration::from_millis(250);
    let waveform = match id {
        SensorId::Accel => accel_waveform,
        SensorId::HeartRate => hrm_waveform,
        _ => baro_waveform,
    };
    Box::new(WaveformDriver::new(id.clone(), interval, waveform))
}
