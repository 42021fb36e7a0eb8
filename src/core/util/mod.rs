// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod executor_service;
pub mod logging;
pub mod temp_dir;

pub use executor_service::{CancellationToken, ExecutorService, TaskError};
pub use logging::{init_logging, ChannelLogSink, LogRecord, LogSink, MemoryLogSink, ProcessLogger};
pub use temp_dir::canonical_temp_dir;
