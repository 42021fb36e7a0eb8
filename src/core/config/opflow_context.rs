// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine-wide context shared by every process and nested process.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::core::config::{EngineConfig, MacroConfig};
use crate::core::error::OpFlowResult;
use crate::core::flow::panic_message;
use crate::core::license::{LicenseCheck, PermissiveLicenseCheck};
use crate::core::statistics::{ExecutionStatistics, StatisticsSink};
use crate::core::store::{ArtifactStore, InMemoryArtifactStore};
use crate::core::util::executor_service::ExecutorService;

/// Hook run by every process when a run finishes
pub type CleanupHook = Arc<dyn Fn() + Send + Sync>;

pub struct OpFlowContext {
    config: EngineConfig,
    macro_config: Arc<MacroConfig>,
    executor: Arc<ExecutorService>,
    statistics: Arc<dyn StatisticsSink>,
    license_check: Arc<dyn LicenseCheck>,
    artifact_store: Arc<dyn ArtifactStore>,
    cleanup_hooks: RwLock<Vec<CleanupHook>>,
}

impl fmt::Debug for OpFlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpFlowContext")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish()
    }
}

impl OpFlowContext {
    /// Context with an in-memory store, permissive licensing and in-process statistics.
    pub fn new(config: EngineConfig) -> OpFlowResult<Self> {
        let executor = ExecutorService::new("opflow", config.worker_threads)?;
        Ok(Self {
            config,
            macro_config: Arc::new(MacroConfig::default()),
            executor: Arc::new(executor),
            statistics: Arc::new(ExecutionStatistics::new()),
            license_check: Arc::new(PermissiveLicenseCheck),
            artifact_store: Arc::new(InMemoryArtifactStore::new()),
            cleanup_hooks: RwLock::new(Vec::new()),
        })
    }

    pub fn with_macro_config(mut self, macro_config: MacroConfig) -> Self {
        self.macro_config = Arc::new(macro_config);
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_license_check(mut self, license_check: Arc<dyn LicenseCheck>) -> Self {
        self.license_check = license_check;
        self
    }

    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifact_store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn macro_config(&self) -> &Arc<MacroConfig> {
        &self.macro_config
    }

    pub fn executor(&self) -> &Arc<ExecutorService> {
        &self.executor
    }

    pub fn statistics(&self) -> &Arc<dyn StatisticsSink> {
        &self.statistics
    }

    pub fn license_check(&self) -> &Arc<dyn LicenseCheck> {
        &self.license_check
    }

    pub fn artifact_store(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifact_store
    }

    pub fn add_cleanup_hook(&self, hook: CleanupHook) {
        self.cleanup_hooks
            .write()
            .expect("OpFlowContext RwLock poisoned")
            .push(hook);
    }

    /// Run every cleanup hook in registration order. A panicking hook is
    /// logged and the rest still run.
    pub fn run_cleanup_hooks(&self) {
        let hooks = self
            .cleanup_hooks
            .read()
            .expect("OpFlowContext RwLock poisoned")
            .clone();
        for (index, hook) in hooks.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook())) {
                log::error!(
                    "Cleanup hook #{} panicked: {}",
                    index,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}
