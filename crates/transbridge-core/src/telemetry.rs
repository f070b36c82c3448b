//! Per-request translation records.
//!
//! Producers enqueue records without blocking into a bounded queue; a single
//! background consumer hands them to a [`TelemetrySink`]. A full queue drops
//! the record and reports [`TelemetryError::QueueFull`] to the producer only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Errors raised by the telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// The queue is full; the record was dropped.
    #[error("telemetry queue is full")]
    QueueFull,

    /// The logger has been closed.
    #[error("telemetry logger is closed")]
    Closed,

    /// The sink could not be opened or written.
    #[error("telemetry I/O error: {0}")]
    Io(String),

    /// A record could not be encoded.
    #[error("telemetry serialization error: {0}")]
    Serialization(String),
}

/// One completed translation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    /// When the record was enqueued.
    pub timestamp: DateTime<Utc>,
    /// Text submitted for translation.
    pub source_text: String,
    /// Translation returned to the caller.
    pub target_text: String,
    /// Source language code as requested.
    pub source_lang: String,
    /// Target language code as requested.
    pub target_lang: String,
    /// Endpoint of the backend that produced the translation.
    pub api_url: String,
    /// Provider of that backend.
    pub provider: String,
    /// Model of that backend.
    pub model: String,
    /// Cache key of the request.
    pub cache_key: String,
    /// Whether the translation was served from cache.
    pub cache_hit: bool,
    /// Wall-clock request time in milliseconds.
    pub process_time_ms: f64,
}

/// Destination of telemetry records.
#[async_trait]
pub trait TelemetrySink: Send {
    /// Persists one record.
    async fn write(&mut self, record: &TranslationRecord) -> Result<(), TelemetryError>;

    /// Flushes buffered records; called once when the logger shuts down.
    async fn flush(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Appends records to a file as JSON lines.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: tokio::fs::File,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns `TelemetryError::Io` if the directory or file cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| TelemetryError::Io(format!("failed to create {}: {}", dir.display(), e)))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| TelemetryError::Io(format!("failed to open {}: {}", path.display(), e)))?;

        Ok(Self { path, file })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    async fn write(&mut self, record: &TranslationRecord) -> Result<(), TelemetryError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| TelemetryError::Serialization(e.to_string()))?;
        line.push(b'\n');
        self.file.write_all(&line).await.map_err(|e| TelemetryError::Io(e.to_string()))
    }

    async fn flush(&mut self) -> Result<(), TelemetryError> {
        self.file.flush().await.map_err(|e| TelemetryError::Io(e.to_string()))
    }
}

/// Bounded, non-blocking telemetry queue with one background consumer.
#[derive(Debug)]
pub struct TranslationLogger {
    sender: Mutex<Option<mpsc::Sender<TranslationRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TranslationLogger {
    /// Starts the consumer task. Must be called from within a Tokio runtime.
    pub fn new(sink: impl TelemetrySink + 'static, queue_size: usize) -> Self {
        let queue_size = if queue_size == 0 { DEFAULT_QUEUE_SIZE } else { queue_size };
        let (sender, receiver) = mpsc::channel(queue_size);
        let worker = tokio::spawn(consume(receiver, sink));

        info!(queue_size, "Translation logger started");

        Self { sender: Mutex::new(Some(sender)), worker: Mutex::new(Some(worker)) }
    }

    /// Opens a JSON-lines file sink and starts the consumer.
    ///
    /// # Errors
    /// Returns `TelemetryError::Io` if the file cannot be opened.
    pub async fn to_file(path: impl AsRef<Path>, queue_size: usize) -> Result<Self, TelemetryError> {
        let sink = JsonLinesSink::open(path).await?;
        Ok(Self::new(sink, queue_size))
    }

    /// Enqueues a record without waiting, stamping it with the current time.
    ///
    /// # Errors
    /// Returns `TelemetryError::QueueFull` if the queue is at capacity (the record
    /// is dropped) or `TelemetryError::Closed` after [`TranslationLogger::close`].
    pub fn log(&self, mut record: TranslationRecord) -> Result<(), TelemetryError> {
        record.timestamp = Utc::now();
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(TelemetryError::Closed)?;
        sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TelemetryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TelemetryError::Closed,
        })
    }

    /// Stops accepting records, drains the queue into the sink and waits for the
    /// consumer to finish. Later calls are no-ops.
    pub async fn close(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Translation logger task ended abnormally");
            }
            info!("Translation logger closed");
        }
    }
}

async fn consume(mut receiver: mpsc::Receiver<TranslationRecord>, mut sink: impl TelemetrySink) {
    let mut written = 0usize;
    while let Some(record) = receiver.recv().await {
        match sink.write(&record).await {
            Ok(()) => written += 1,
            Err(e) => warn!(error = %e, cache_key = %record.cache_key, "Failed to write translation record"),
        }
    }
    if let Err(e) = sink.flush().await {
        warn!(error = %e, "Failed to flush translation records");
    }
    debug!(written, "Translation logger drained");
}
