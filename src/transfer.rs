//! Best-effort delivery of completed log files over a connection-oriented
//! link.
//!
//! The session treats transfer as a sink with its own retry policy: a
//! rotation hands a file to the [`TransferWorker`] and moves on, and a
//! failed delivery only ever leaves the file on local storage.

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Size of each write on the link; the receiving side reassembles.
pub const CHUNK_SIZE: usize = 512;

/// Connect/write deadline so a dead link cannot stall a delivery forever.
const LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the transfer boundary.
#[derive(Debug)]
pub enum TransferError {
    /// Bad or missing transfer target
    Config(String),
    /// Connection or write failure on the link
    Link(String),
    /// Envelope could not be serialized
    Serialization(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Config(msg) => write!(f, "Transfer config error: {msg}"),
            TransferError::Link(msg) => write!(f, "Transfer link error: {msg}"),
            TransferError::Serialization(msg) => {
                write!(f, "Transfer serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for TransferError {}

/// Wire envelope for a delivered file.
#[derive(Debug, Serialize)]
struct FileEnvelope<'a> {
    t: &'static str,
    n: &'a str,
    c: &'a str,
    timestamp: i64,
}

/// Destination for completed log files.
pub trait TransferSink: Send {
    fn send_file(&self, name: &str, contents: &str) -> Result<(), TransferError>;
}

/// Async client delivering files over TCP as a newline-terminated JSON
/// envelope, written in length-bounded chunks.
pub struct LinkTransferClient {
    target: String,
    device_id: String,
}

impl LinkTransferClient {
    pub fn new(target: impl Into<String>) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!("recorder-{}-{}", host, &uuid::Uuid::new_v4().to_string()[..8]);

        Self {
            target: target.into(),
            device_id,
        }
    }

    /// Stable identifier for this recorder instance, used in delivery logs.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn send(&self, name: &str, contents: &str) -> Result<(), TransferError> {
        let envelope = FileEnvelope {
            t: "file",
            n: name,
            c: contents,
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut payload = serde_json::to_vec(&envelope)
            .map_err(|e| TransferError::Serialization(e.to_string()))?;
        payload.push(b'\n');

        let mut stream = tokio::time::timeout(LINK_TIMEOUT, TcpStream::connect(&self.target))
            .await
            .map_err(|_| TransferError::Link(format!("Connect to {} timed out", self.target)))?
            .map_err(|e| TransferError::Link(format!("Connect to {} failed: {e}", self.target)))?;

        for chunk in payload.chunks(CHUNK_SIZE) {
            tokio::time::timeout(LINK_TIMEOUT, stream.write_all(chunk))
                .await
                .map_err(|_| TransferError::Link("Write timed out".to_string()))?
                .map_err(|e| TransferError::Link(format!("Write failed: {e}")))?;
        }

        stream
            .flush()
            .await
            .map_err(|e| TransferError::Link(format!("Flush failed: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| TransferError::Link(format!("Shutdown failed: {e}")))?;

        log::info!(
            "Sent file {name} ({} bytes) to {} as {}",
            contents.len(),
            self.target,
            self.device_id
        );
        Ok(())
    }
}

/// Blocking wrapper around [`LinkTransferClient`] for synchronous contexts.
pub struct BlockingTransferClient {
    inner: LinkTransferClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingTransferClient {
    pub fn new(target: impl Into<String>) -> Result<Self, TransferError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(TransferError::Config("Empty transfer target".to_string()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransferError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: LinkTransferClient::new(target),
            runtime,
        })
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

impl TransferSink for BlockingTransferClient {
    fn send_file(&self, name: &str, contents: &str) -> Result<(), TransferError> {
        self.runtime.block_on(self.inner.send(name, contents))
    }
}

/// A queued delivery.
pub struct TransferJob {
    pub name: String,
    pub contents: String,
}

/// Outcome of a delivery attempt.
pub struct TransferOutcome {
    pub name: String,
    pub result: Result<(), TransferError>,
}

/// Background worker draining delivery jobs so a slow link never blocks
/// the sampling tick.
pub struct TransferWorker {
    jobs: Option<Sender<TransferJob>>,
    outcomes: Receiver<TransferOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl TransferWorker {
    pub fn spawn(sink: Box<dyn TransferSink>) -> Self {
        let (job_tx, job_rx) = unbounded::<TransferJob>();
        let (outcome_tx, outcome_rx) = unbounded::<TransferOutcome>();

        let handle = std::thread::spawn(move || {
            for job in job_rx {
                let result = sink.send_file(&job.name, &job.contents);
                if outcome_tx
                    .send(TransferOutcome {
                        name: job.name,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            handle: Some(handle),
        }
    }

    /// Queue a file for delivery (fire-and-forget).
    pub fn enqueue(&self, name: String, contents: String) {
        if let Some(jobs) = &self.jobs {
            let _ = jobs.send(TransferJob { name, contents });
        }
    }

    /// Collect the outcome of a finished delivery attempt, if any.
    pub fn try_outcome(&self) -> Option<TransferOutcome> {
        self.outcomes.try_recv().ok()
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        // Closing the job channel lets the worker thread exit.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
