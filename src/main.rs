//! Clinirec CLI
//!
//! Hosts the recording session in the foreground and gives the operator the
//! same handles the device menu exposes: toggle recording, view and delete
//! files, adjust sensors and period.

use clap::{Parser, Subcommand};
use clinirec::config::Config;
use clinirec::sensor::{RecorderRegistry, SensorId};
use clinirec::session::{always_append, RecordingSession, SessionState};
use clinirec::transfer::{BlockingTransferClient, TransferSink};
use clinirec::VERSION;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "clinirec")]
#[command(version = VERSION)]
#[command(about = "Continuous sensor-data CSV recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start recording in the foreground
    Start,

    /// Ask a running recorder to stop
    Stop,

    /// Show recorder status and configuration
    Status,

    /// Show the persisted configuration
    Config,

    /// List recorded log files
    Files,

    /// Delete a recorded log file
    Delete {
        /// File name as shown by `files`
        name: String,
    },

    /// Toggle a sensor on or off (stops any active recording)
    Sensor {
        /// Sensor id (accel, hrm, baro, or a plugin id)
        id: String,
    },

    /// Set the sampling period in seconds (stops any active recording)
    Period {
        /// Seconds between samples, minimum 1
        secs: u32,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => cmd_start(),
        Commands::Stop => cmd_stop(),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Files => cmd_files(),
        Commands::Delete { name } => cmd_delete(&name),
        Commands::Sensor { id } => cmd_sensor(&id),
        Commands::Period { secs } => cmd_period(secs),
    }
}

fn build_session(enable_transfer: bool) -> RecordingSession {
    let config_path = Config::config_path();

    let sink: Option<Box<dyn TransferSink>> = if enable_transfer {
        match Config::load_from(&config_path) {
            Ok(config) => config.transfer_target.and_then(|target| {
                match BlockingTransferClient::new(target) {
                    Ok(client) => {
                        println!("Transfer link: enabled (device {})", client.device_id());
                        Some(Box::new(client) as Box<dyn TransferSink>)
                    }
                    Err(e) => {
                        eprintln!("Warning: transfer link disabled: {e}");
                        None
                    }
                }
            }),
            Err(e) => {
                eprintln!("Warning: could not read configuration: {e}");
                None
            }
        }
    } else {
        None
    };

    let registry = RecorderRegistry::with_builtins();

    match RecordingSession::new(config_path, registry, always_append, sink) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: could not initialize session: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_start() {
    println!("Clinirec v{VERSION}");
    println!();

    let mut session = build_session(true);

    {
        let config = session.config();
        println!("Starting recording...");
        println!("  Subject: {}", config.subject_id);
        println!("  Period: {}s", config.sample_period_secs);
        println!(
            "  Sensors: {}",
            config
                .enabled_sensors
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("  Log directory: {:?}", config.log_dir);
    }

    if let Err(e) = session.start() {
        eprintln!("Error: could not start recording: {e}");
        std::process::exit(1);
    }
    println!("  File: {}", session.config().active_file.as_deref().unwrap_or("?"));
    println!();
    println!("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    // Poll the persisted config so `clinirec stop` in another process can
    // stop this recorder, mirroring the device menu's toggle.
    let mut last_config_check = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(on_disk) = Config::load_from(&Config::config_path()) {
                if !on_disk.is_recording && session.is_recording() {
                    println!();
                    println!("Stop requested, shutting down...");
                    break;
                }
            }
            last_config_check = Instant::now();
        }

        if session.pump().is_err() {
            // Fail-stop: the session logged the failure and forced the
            // recording toggle off.
            eprintln!("Recording stopped after a write failure.");
            break;
        }

        if session.state() == SessionState::StoppedOnError {
            break;
        }
    }

    if session.is_recording() {
        if let Err(e) = session.stop() {
            eprintln!("Warning: error while stopping: {e}");
        }
    }
    println!("Recording stopped.");
}

fn cmd_stop() {
    let mut config = Config::load().unwrap_or_default();
    config.is_recording = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Stop requested. A running recorder will shut down shortly.");
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Clinirec Status");
    println!("===============");
    println!();
    println!(
        "Recording: {}",
        if config.is_recording { "on" } else { "off" }
    );
    println!(
        "Active file: {}",
        config.active_file.as_deref().unwrap_or("none")
    );
    println!("Subject: {}", config.subject_id);
    println!("Period: {}s", config.sample_period_secs);
    println!(
        "Sensors: {}",
        config
            .enabled_sensors
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Locale offset: {}h", config.locale_offset_hours);
    println!(
        "Transfer target: {}",
        config.transfer_target.as_deref().unwrap_or("none")
    );
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_files() {
    let session = build_session(false);
    match session.list_log_files() {
        Ok(files) if files.is_empty() => println!("No log files found."),
        Ok(files) => {
            for name in files {
                println!("{name}");
            }
        }
        Err(e) => {
            eprintln!("Error listing log files: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_delete(name: &str) {
    let session = build_session(false);
    match session.delete_log_file(name) {
        Ok(()) => println!("Deleted {name}"),
        Err(e) => {
            eprintln!("Error deleting {name}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_sensor(id: &str) {
    let mut config = Config::load().unwrap_or_default();
    let sensor = SensorId::from(id);

    if let Some(pos) = config.enabled_sensors.iter().position(|s| *s == sensor) {
        config.enabled_sensors.remove(pos);
        println!("Disabled sensor '{sensor}'");
    } else {
        config.enabled_sensors.push(sensor.clone());
        println!("Enabled sensor '{sensor}'");
    }

    // Changing the field set mid-file is never attempted.
    if config.is_recording {
        config.is_recording = false;
        println!("Recording stopped; start again to apply the new sensor set.");
    }

    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
}

fn cmd_period(secs: u32) {
    if secs < 1 {
        eprintln!("Error: period must be at least 1 second");
        std::process::exit(1);
    }

    let mut config = Config::load().unwrap_or_default();
    config.sample_period_secs = secs;

    if config.is_recording {
        config.is_recording = false;
        println!("Recording stopped; start again to apply the new period.");
    }

    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Sampling period set to {secs}s");
}
