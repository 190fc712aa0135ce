//! Recording session: the state machine binding the recorder registry, the
//! sampling scheduler and the log-file lifecycle together.
//!
//! The session runs on a single thread. Sensor drivers deliver samples over
//! a bounded channel; the host loop calls [`RecordingSession::pump`], which
//! alternates between draining that channel into the accumulators and
//! running the scheduler tick. The persisted [`Config`] is the only state
//! shared with the external menu/UI collaborator, and every mutation of it
//! goes through the session's operations.

pub mod scheduler;

pub use scheduler::Scheduler;

use crate::config::{Config, ConfigError};
use crate::logfile::{self, LogFile, OpenMode, TIMESTAMP_FORMAT};
use crate::sensor::{csv_header, format_value, RecorderRegistry, SensorRecorder, SensorSample};
use crate::transfer::{TransferSink, TransferWorker};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Capacity of the sample channel between drivers and the session.
const SAMPLE_QUEUE_CAP: usize = 1024;

/// Delay before the single transfer retry.
const RETRY_BACKOFF_SECS: i64 = 5 * 60;

/// Local hour during which failed transfers are retried.
const MAINTENANCE_HOUR: u32 = 0;

/// What to do when the target log file already has incompatible content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionDecision {
    /// Keep the file; a header mismatch gets the delimiter-and-new-header
    /// treatment
    Append,
    /// Truncate the file and start over
    Overwrite,
    /// Start a numbered sibling file
    NewFile,
    /// Abort the start
    Cancel,
}

/// Pure decision function consulted when the target file's header differs
/// from the one implied by the enabled sensor set.
pub type CollisionPolicy = fn(existing_header: &str, new_header: &str) -> CollisionDecision;

/// Default collision policy: keep appending, preserving prior rows.
pub fn always_append(_existing: &str, _new: &str) -> CollisionDecision {
    CollisionDecision::Append
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Recording,
    RotatingFile,
    StoppedOnError,
}

/// Errors surfaced by session operations.
#[derive(Debug)]
pub enum SessionError {
    /// Persisted configuration could not be read or written
    Config(ConfigError),
    /// The collision policy declined the start
    StartCancelled,
    /// Log file I/O failed; fatal to the current session
    Io(io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Config(e) => write!(f, "Configuration error: {e}"),
            SessionError::StartCancelled => {
                write!(f, "Recording start cancelled by collision policy")
            }
            SessionError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Config(e) => Some(e),
            SessionError::StartCancelled => None,
            SessionError::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}

struct PendingRetry {
    name: String,
    next_attempt: DateTime<Utc>,
    /// The retry has been queued; its outcome is final either way.
    fired: bool,
}

/// The recording state machine.
pub struct RecordingSession {
    config: Config,
    config_path: PathBuf,
    registry: RecorderRegistry,
    policy: CollisionPolicy,
    transfer: Option<TransferWorker>,
    state: SessionState,
    recorders: Vec<SensorRecorder>,
    current_file: Option<LogFile>,
    scheduler: Option<Scheduler>,
    sample_tx: Sender<SensorSample>,
    sample_rx: Receiver<SensorSample>,
    pending_retry: Option<PendingRetry>,
}

impl RecordingSession {
    /// Create a session over the configuration at `config_path`. Defaults
    /// for missing keys are applied and persisted back immediately.
    pub fn new(
        config_path: PathBuf,
        registry: RecorderRegistry,
        policy: CollisionPolicy,
        sink: Option<Box<dyn TransferSink>>,
    ) -> Result<Self, SessionError> {
        let config = Config::load_from(&config_path)?;
        config.save_to(&config_path)?;

        let (sample_tx, sample_rx) = bounded(SAMPLE_QUEUE_CAP);

        Ok(Self {
            config,
            config_path,
            registry,
            policy,
            transfer: sink.map(TransferWorker::spawn),
            state: SessionState::Stopped,
            recorders: Vec::new(),
            current_file: None,
            scheduler: None,
            sample_tx,
            sample_rx,
            pending_retry: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Start recording, resolving the target file against the current local
    /// date and subject id.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.start_at(Utc::now())
    }

    /// [`start`](Self::start) with an explicit clock, for hosts with their
    /// own time source.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.state == SessionState::Recording {
            return Ok(());
        }
        self.state = SessionState::Starting;

        match self.try_start(now) {
            Ok(()) => {
                self.state = SessionState::Recording;
                Ok(())
            }
            Err(e) => {
                self.teardown();
                self.state = SessionState::Stopped;
                Err(e)
            }
        }
    }

    fn try_start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        // The menu collaborator may have edited the settings since the last
        // operation; it owns the file, we own the invariants.
        self.config = Config::load_from(&self.config_path)?;
        self.config.ensure_directories()?;

        let mut recorders = self.registry.build_active(&self.config.enabled_sensors);
        let header = csv_header(&recorders);

        // Repair the active-file invariant: reuse it only if it still names
        // today's file for this subject.
        let wanted = match &self.config.active_file {
            Some(name) if self.config.file_is_current(name, now) => name.clone(),
            _ => self.config.file_name_for(self.config.local_date(now)),
        };

        let (file, resolved) = self.resolve_target(&wanted, &header)?;

        for recorder in recorders.iter_mut() {
            if let Err(e) = recorder.start(self.sample_tx.clone()) {
                log::error!("Could not start sensor '{}': {e}", recorder.id());
            }
        }

        self.recorders = recorders;
        self.current_file = Some(file);
        self.scheduler = Some(Scheduler::new(self.config.sample_period_secs, now));

        self.config.is_recording = true;
        self.config.active_file = Some(resolved.clone());
        self.persist()?;

        log::info!(
            "Recording started: file {resolved}, period {}s, sensors [{}]",
            self.config.sample_period_secs,
            self.config
                .enabled_sensors
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    /// Open the target file, consulting the collision policy when it exists
    /// with a different header.
    fn resolve_target(
        &self,
        wanted_name: &str,
        header: &[String],
    ) -> Result<(LogFile, String), SessionError> {
        let path = self.config.log_dir.join(wanted_name);
        let wanted_header = header.join(",");

        let decision = match logfile::read_first_line(&path)? {
            Some(existing) if existing.trim() != wanted_header => {
                let decision = (self.policy)(&existing, &wanted_header);
                log::info!(
                    "Header collision on {wanted_name}: policy decided {decision:?}"
                );
                decision
            }
            _ => CollisionDecision::Append,
        };

        match decision {
            CollisionDecision::Append => {
                let mut file = LogFile::open(&path, OpenMode::Append)?;
                file.ensure_header(header)?;
                Ok((file, wanted_name.to_string()))
            }
            CollisionDecision::Overwrite => {
                let mut file = LogFile::open(&path, OpenMode::Truncate)?;
                file.ensure_header(header)?;
                Ok((file, wanted_name.to_string()))
            }
            CollisionDecision::NewFile => {
                let stem = wanted_name.trim_end_matches(".csv");
                let mut n = 1;
                let (candidate_path, candidate) = loop {
                    let candidate = format!("{stem}_{n}.csv");
                    let candidate_path = self.config.log_dir.join(&candidate);
                    if !candidate_path.exists() {
                        break (candidate_path, candidate);
                    }
                    n += 1;
                };
                let mut file = LogFile::open(&candidate_path, OpenMode::Append)?;
                file.ensure_header(header)?;
                Ok((file, candidate))
            }
            CollisionDecision::Cancel => Err(SessionError::StartCancelled),
        }
    }

    /// Stop recording. Safe to call from any state.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.teardown();
        self.config.is_recording = false;
        self.persist()?;
        self.state = SessionState::Stopped;
        log::info!("Recording stopped");
        Ok(())
    }

    /// Re-read the persisted configuration and restart the scheduler and
    /// recorders to reflect it. Any change to the active field set or the
    /// period goes through a full stop and start; a live reconfiguration of
    /// an open file is never attempted.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        self.teardown();
        self.state = SessionState::Stopped;
        self.config = Config::load_from(&self.config_path)?;

        if self.config.is_recording {
            self.start()
        } else {
            Ok(())
        }
    }

    /// Route an incoming sample to its recorder's accumulator.
    pub fn dispatch(&mut self, sample: SensorSample) {
        if self.state != SessionState::Recording {
            return;
        }
        if let Some(recorder) = self
            .recorders
            .iter_mut()
            .find(|r| *r.id() == sample.id)
        {
            recorder.apply_sample(&sample.values);
        }
    }

    /// One sampling tick: drain every accumulator into a CSV row, detect
    /// day rollover, append. Any I/O failure fail-stops the session.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            return Ok(());
        }

        let mut row = vec![now.format(TIMESTAMP_FORMAT).to_string()];
        for recorder in self.recorders.iter_mut() {
            row.extend(recorder.read_and_reset().into_iter().map(format_value));
        }

        let local_date = self.config.local_date(now);
        let rollover = self
            .config
            .active_file
            .as_deref()
            .map(|name| !name.contains(&local_date.format("%Y-%m-%d").to_string()))
            .unwrap_or(false);

        let result = if rollover {
            self.rotate(&row, local_date)
        } else {
            match self.current_file.as_mut() {
                Some(file) => file.append_row(&row).map_err(SessionError::Io),
                None => Err(SessionError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no open log file",
                ))),
            }
        };

        if let Err(e) = result {
            self.fail_stop(&e);
            return Err(e);
        }

        self.service_transfer(now);
        Ok(())
    }

    /// Day rollover: final row to the old file, hand it off for transfer,
    /// open the new day's file, persist the new name.
    fn rotate(&mut self, final_row: &[String], new_date: NaiveDate) -> Result<(), SessionError> {
        self.state = SessionState::RotatingFile;

        let old_name = self.config.active_file.clone().unwrap_or_default();

        if let Some(file) = self.current_file.as_mut() {
            file.append_row(final_row)?;
        }

        self.enqueue_transfer(&old_name);

        let header = csv_header(&self.recorders);
        let new_name = self.config.file_name_for(new_date);
        let new_path = self.config.log_dir.join(&new_name);

        let file = match self.current_file.take() {
            Some(old) => old.rotate_to(new_path, &header)?,
            None => {
                let mut file = LogFile::open(new_path, OpenMode::Append)?;
                file.ensure_header(&header)?;
                file
            }
        };

        self.current_file = Some(file);
        self.config.active_file = Some(new_name.clone());
        self.persist()?;

        self.state = SessionState::Recording;
        log::info!("Day rollover: {old_name} -> {new_name}");
        Ok(())
    }

    /// Fail-stop policy: log, force the recording toggle off, disarm the
    /// scheduler, stop the recorders. The write is never retried, a failing
    /// storage medium must not be hammered.
    fn fail_stop(&mut self, err: &SessionError) {
        log::error!("Recording failed, stopping: {err}");
        self.teardown();
        self.config.is_recording = false;
        if let Err(persist_err) = self.persist() {
            log::error!("Could not persist recording state: {persist_err}");
        }
        self.state = SessionState::StoppedOnError;
    }

    fn teardown(&mut self) {
        self.scheduler = None;
        for recorder in self.recorders.iter_mut() {
            recorder.stop();
        }
        self.recorders.clear();
        self.current_file = None;
        self.pending_retry = None;
        // Drop queued samples so a restart begins from a clean accumulator.
        while self.sample_rx.try_recv().is_ok() {}
    }

    fn persist(&self) -> Result<(), ConfigError> {
        self.config.save_to(&self.config_path)
    }

    /// Queue a completed file for delivery. Fire-and-forget: failures are
    /// reported back through the worker and only ever schedule a retry.
    fn enqueue_transfer(&self, name: &str) {
        let Some(worker) = &self.transfer else {
            return;
        };

        let path = self.config.log_dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) if !contents.is_empty() => {
                log::info!("Queueing {name} for transfer");
                worker.enqueue(name.to_string(), contents);
            }
            Ok(_) => log::warn!("Skipping transfer of empty file {name}"),
            Err(e) => log::error!("Could not read {name} for transfer: {e}"),
        }
    }

    /// Collect finished delivery attempts and drive the bounded retry
    /// policy: one retry, five minutes later, only inside the maintenance
    /// hour. A failure outside the window leaves the file on local storage.
    fn service_transfer(&mut self, now: DateTime<Utc>) {
        let in_window = self.in_maintenance_window(now);

        if let Some(worker) = &self.transfer {
            while let Some(outcome) = worker.try_outcome() {
                let was_retry = self
                    .pending_retry
                    .as_ref()
                    .is_some_and(|p| p.fired && p.name == outcome.name);

                match outcome.result {
                    Ok(()) => {
                        log::info!("Transferred {}", outcome.name);
                        if was_retry {
                            self.pending_retry = None;
                        }
                    }
                    Err(e) if was_retry => {
                        // One retry per failure; a failed retry is final.
                        log::warn!(
                            "Retry of {} failed ({e}), file kept on local storage",
                            outcome.name
                        );
                        self.pending_retry = None;
                    }
                    Err(e) if in_window && self.pending_retry.is_none() => {
                        log::warn!(
                            "Transfer of {} failed ({e}), retrying in {} minutes",
                            outcome.name,
                            RETRY_BACKOFF_SECS / 60
                        );
                        self.pending_retry = Some(PendingRetry {
                            name: outcome.name,
                            next_attempt: now + ChronoDuration::seconds(RETRY_BACKOFF_SECS),
                            fired: false,
                        });
                    }
                    Err(e) => log::warn!(
                        "Transfer of {} failed ({e}), file kept on local storage",
                        outcome.name
                    ),
                }
            }
        }

        let due = self
            .pending_retry
            .as_ref()
            .is_some_and(|p| !p.fired && now >= p.next_attempt);
        if due {
            if in_window {
                // Mark fired before queueing so the outcome is seen as the
                // retry's and never rescheduled.
                let name = match self.pending_retry.as_mut() {
                    Some(pending) => {
                        pending.fired = true;
                        pending.name.clone()
                    }
                    None => return,
                };
                self.enqueue_transfer(&name);
            } else if let Some(pending) = self.pending_retry.take() {
                log::warn!("Retry window over, {} kept on local storage", pending.name);
            }
        }
    }

    fn in_maintenance_window(&self, now: DateTime<Utc>) -> bool {
        now.with_timezone(&self.config.local_offset()).hour() == MAINTENANCE_HOUR
    }

    /// One iteration of the host loop: drain the sample channel until the
    /// next tick is due, then tick.
    pub fn pump(&mut self) -> Result<(), SessionError> {
        let now = Utc::now();
        let timeout = self
            .scheduler
            .as_ref()
            .map(|s| s.timeout_until_due(now).min(Duration::from_millis(250)))
            .unwrap_or(Duration::from_millis(250));

        match self.sample_rx.recv_timeout(timeout) {
            Ok(sample) => self.dispatch(sample),
            Err(RecvTimeoutError::Timeout) => {}
            // The session keeps a sender alive, so this cannot happen.
            Err(RecvTimeoutError::Disconnected) => {}
        }

        let now = Utc::now();
        let due = self.scheduler.as_mut().is_some_and(|s| s.poll(now));
        if due {
            let result = self.tick(now);
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.finish_tick();
            }
            result?;
        }
        Ok(())
    }

    /// Names of the CSV log files on local storage, sorted.
    pub fn list_log_files(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        match std::fs::read_dir(&self.config.log_dir) {
            Ok(entries) => {
                for entry in entries {
                    let name = entry?.file_name().to_string_lossy().to_string();
                    if name.ends_with(".csv") {
                        names.push(name);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        names.sort();
        Ok(names)
    }

    /// Delete a log file by name. The file the active session is writing
    /// cannot be deleted.
    pub fn delete_log_file(&self, name: &str) -> io::Result<()> {
        if name.contains(|c| c == '/' || c == '\\') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "log file name must not contain path separators",
            ));
        }
        if self.is_recording() && self.config.active_file.as_deref() == Some(name) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot delete the active log file while recording",
            ));
        }
        logfile::erase(&self.config.log_dir.join(name))
    }
}
