// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run outcome statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{FailureKind, OpFlowError, OpFlowResult};

/// Terminal and start events of a run, keyed by the run id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatisticsEvent {
    Started { run_id: Uuid, process: String },
    Succeeded { run_id: Uuid, process: String },
    Stopped { run_id: Uuid, process: String },
    Failed {
        run_id: Uuid,
        process: String,
        kind: FailureKind,
        operator: Option<String>,
    },
}

impl StatisticsEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Started { run_id, .. }
            | Self::Succeeded { run_id, .. }
            | Self::Stopped { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }

    /// Terminal event for a run that ended with `error`.
    pub fn for_failure(run_id: Uuid, process: &str, error: &OpFlowError) -> Self {
        match error.failure_kind() {
            FailureKind::Stopped => Self::Stopped {
                run_id,
                process: process.to_string(),
            },
            kind => Self::Failed {
                run_id,
                process: process.to_string(),
                kind,
                operator: error.operator().map(str::to_string),
            },
        }
    }
}

pub trait StatisticsSink: Send + Sync {
    fn record(&self, event: &StatisticsEvent);
}

/// Serializable view of [`ExecutionStatistics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub stopped: u64,
    pub user_errors: u64,
    pub operator_exceptions: u64,
    pub failures_by_operator: BTreeMap<String, u64>,
}

impl StatisticsSnapshot {
    pub fn to_json(&self) -> OpFlowResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            OpFlowError::runtime_with_source("Failed to serialize statistics", Box::new(e))
        })
    }
}

/// Lock-free outcome tallies
pub struct ExecutionStatistics {
    started: CachePadded<AtomicU64>,
    succeeded: CachePadded<AtomicU64>,
    stopped: CachePadded<AtomicU64>,
    user_errors: CachePadded<AtomicU64>,
    operator_exceptions: CachePadded<AtomicU64>,
    failures_by_operator: Mutex<BTreeMap<String, u64>>,
}

impl fmt::Debug for ExecutionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStatistics")
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("succeeded", &self.succeeded.load(Ordering::Relaxed))
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for ExecutionStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStatistics {
    pub fn new() -> Self {
        Self {
            started: CachePadded::new(AtomicU64::new(0)),
            succeeded: CachePadded::new(AtomicU64::new(0)),
            stopped: CachePadded::new(AtomicU64::new(0)),
            user_errors: CachePadded::new(AtomicU64::new(0)),
            operator_exceptions: CachePadded::new(AtomicU64::new(0)),
            failures_by_operator: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            user_errors: self.user_errors.load(Ordering::Relaxed),
            operator_exceptions: self.operator_exceptions.load(Ordering::Relaxed),
            failures_by_operator: self
                .failures_by_operator
                .lock()
                .expect("ExecutionStatistics mutex poisoned")
                .clone(),
        }
    }
}

impl StatisticsSink for ExecutionStatistics {
    fn record(&self, event: &StatisticsEvent) {
        match event {
            StatisticsEvent::Started { .. } => {
                self.started.fetch_add(1, Ordering::Relaxed);
            }
            StatisticsEvent::Succeeded { .. } => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            StatisticsEvent::Stopped { .. } => {
                self.stopped.fetch_add(1, Ordering::Relaxed);
            }
            StatisticsEvent::Failed { kind, operator, .. } => {
                match kind {
                    FailureKind::UserError => self.user_errors.fetch_add(1, Ordering::Relaxed),
                    _ => self.operator_exceptions.fetch_add(1, Ordering::Relaxed),
                };
                if let Some(operator) = operator {
                    *self
                        .failures_by_operator
                        .lock()
                        .expect("ExecutionStatistics mutex poisoned")
                        .entry(operator.clone())
                        .or_insert(0) += 1;
                }
            }
        }
    }
}
