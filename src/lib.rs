//! Clinirec - continuous sensor-data CSV recorder.
//!
//! This library records a configurable set of sensors at a fixed period
//! into day-scoped CSV files, rotating at local-day boundaries and
//! optionally relaying completed files over a short-range link.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Clinirec                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────────────┐     │
//! │  │  Sensor   │──▶│ Accumulators │──▶│    Scheduler     │     │
//! │  │  drivers  │   │ (read-clear) │   │ (periodic tick)  │     │
//! │  └───────────┘   └──────────────┘   └──────────────────┘     │
//! │        │                                     │               │
//! │        ▼                                     ▼               │
//! │  ┌───────────┐                       ┌──────────────┐        │
//! │  │ Recorder  │                       │   LogFile    │        │
//! │  │ registry  │                       │ (CSV, daily) │        │
//! │  └───────────┘                       └──────┬───────┘        │
//! │                                             ▼                │
//! │                                      ┌──────────────┐        │
//! │                                      │ TransferSink │        │
//! │                                      └──────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use clinirec::config::Config;
//! use clinirec::sensor::RecorderRegistry;
//! use clinirec::session::{always_append, RecordingSession};
//!
//! let registry = RecorderRegistry::with_builtins();
//! let mut session =
//!     RecordingSession::new(Config::config_path(), registry, always_append, None)
//!         .expect("config");
//!
//! session.start().expect("start recording");
//! loop {
//!     if session.pump().is_err() {
//!         break; // fail-stop: the session already logged and disarmed
//!     }
//! }
//! ```

pub mod config;
pub mod logfile;
pub mod sensor;
pub mod session;
pub mod transfer;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use logfile::{LogFile, OpenMode};
pub use sensor::{RecorderRegistry, SensorId, SensorPlugin, SensorRecorder, SensorSample};
pub use session::{
    always_append, CollisionDecision, CollisionPolicy, RecordingSession, SessionError,
    SessionState,
};
pub use transfer::{BlockingTransferClient, TransferError, TransferSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
