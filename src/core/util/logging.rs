// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Process Logging
//!
//! Library code logs through the `log` facade. On top of that every process
//! owns a [`ProcessLogger`] that gates records by the run's verbosity and
//! forwards them to a run-scoped [`LogSink`] when one is attached.
//!
//! Binaries and tests install the `env_logger` backend with [`init_logging`].

use std::fmt;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use log::{Level, LevelFilter};

/// Install `env_logger` once, honouring `RUST_LOG` (default `info`).
///
/// Safe to call repeatedly; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// A log line emitted by a running process
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub process: String,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<5} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.process,
            self.message
        )
    }
}

/// Receiver of a single run's log records
pub trait LogSink: fmt::Debug + Send + Sync {
    fn accept(&self, record: &LogRecord);
}

/// Sink collecting records in memory
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().expect("MemoryLogSink mutex poisoned").clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn accept(&self, record: &LogRecord) {
        self.records
            .lock()
            .expect("MemoryLogSink mutex poisoned")
            .push(record.clone());
    }
}

/// Sink forwarding records to a channel, e.g. for a controller UI thread
#[derive(Debug)]
pub struct ChannelLogSink {
    sender: Sender<LogRecord>,
}

impl ChannelLogSink {
    pub fn new(sender: Sender<LogRecord>) -> Self {
        Self { sender }
    }
}

impl LogSink for ChannelLogSink {
    fn accept(&self, record: &LogRecord) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(record.clone());
    }
}

/// Verbosity-gated logger owned by a process
#[derive(Debug)]
pub struct ProcessLogger {
    process: String,
    level: RwLock<LevelFilter>,
    sink: RwLock<Option<std::sync::Arc<dyn LogSink>>>,
}

impl ProcessLogger {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            level: RwLock::new(LevelFilter::Info),
            sink: RwLock::new(None),
        }
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.write().expect("ProcessLogger RwLock poisoned") = level;
    }

    pub fn level(&self) -> LevelFilter {
        *self.level.read().expect("ProcessLogger RwLock poisoned")
    }

    pub fn attach_sink(&self, sink: std::sync::Arc<dyn LogSink>) {
        *self.sink.write().expect("ProcessLogger RwLock poisoned") = Some(sink);
    }

    /// Detach the run-scoped sink; returns whether one was attached.
    pub fn detach_sink(&self) -> bool {
        self.sink
            .write()
            .expect("ProcessLogger RwLock poisoned")
            .take()
            .is_some()
    }

    pub fn has_sink(&self) -> bool {
        self.sink
            .read()
            .expect("ProcessLogger RwLock poisoned")
            .is_some()
    }

    pub fn log(&self, level: Level, message: &str) {
        if level > self.level() {
            return;
        }
        log::log!(target: "opflow::process", level, "[Process '{}'] {}", self.process, message);
        let sink = self
            .sink
            .read()
            .expect("ProcessLogger RwLock poisoned")
            .clone();
        if let Some(sink) = sink {
            sink.accept(&LogRecord {
                timestamp: Local::now(),
                level,
                process: self.process.clone(),
                message: message.to_string(),
            });
        }
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }
}
