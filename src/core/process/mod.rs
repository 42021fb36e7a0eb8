// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Process
//!
//! A [`Process`] owns everything one operator tree needs to run: the
//! [`RunState`], the macro table and expander, the flow filter chain, the
//! per-run scope, the random stream and the nesting depth. Runs go through
//! the phases of [`ExecutionPhase`]:
//!
//! ```text
//! Idle -> Preparing -> LoadingInput -> Executing -> Saving -> Finished
//!             \______________\______________\_________\____> Failed | Stopped
//! ```
//!
//! A process is shared with controller threads through an `Arc`; `pause`,
//! `resume` and `stop` may be called from any thread while `run` executes.
//!
//! ```rust,ignore
//! let process = Arc::new(Process::new("churn", context, tree));
//! let outputs = process.run(ExecutionContext::new(), Vec::new())?;
//! ```

mod io;
mod nesting;
mod pipeline;
mod run_scope;

pub use nesting::NestingGuard;
pub use run_scope::{RunScope, TransientObject};

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::config::{verbosity_to_level, OpFlowContext, OperatorVersion, DEFAULT_VERBOSITY};
use crate::core::error::{OpFlowError, OpFlowResult};
use crate::core::flow::FlowFilterChain;
use crate::core::macros::{MacroExpander, MacroTable, ProcessLocation};
use crate::core::operator::{ArtifactRef, Operator, OperatorTree, TreeLookup};
use crate::core::state::{BreakpointLocation, ProcessState, RunState};
use crate::core::util::executor_service::CancellationToken;
use crate::core::util::logging::ProcessLogger;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPhase {
    Idle,
    Preparing,
    LoadingInput,
    Executing,
    Saving,
    Finished,
    Failed,
    Stopped,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Process {
    name: String,
    context: Arc<OpFlowContext>,
    tree: Arc<dyn OperatorTree>,
    run_state: RunState,
    macros: Arc<MacroTable>,
    expander: MacroExpander,
    flow_filters: FlowFilterChain,
    scope: RunScope,
    random: Mutex<StdRng>,
    nesting: NestingGuard,
    phase: RwLock<ExecutionPhase>,
    logger: ProcessLogger,
    cancellation: CancellationToken,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("state", &self.run_state.state())
            .field("phase", &self.phase())
            .field("nesting_depth", &self.nesting.depth())
            .finish()
    }
}

impl Process {
    pub fn new(
        name: impl Into<String>,
        context: Arc<OpFlowContext>,
        tree: Arc<dyn OperatorTree>,
    ) -> Self {
        let name = name.into();
        let macros = Arc::new(MacroTable::new(context.macro_config().clone()));
        let expander = MacroExpander::new(
            macros.clone(),
            Arc::new(TreeLookup(tree.clone())),
            context.config().compatibility_level,
        );
        let logger = ProcessLogger::new(name.clone());
        logger.set_level(verbosity_to_level(
            DEFAULT_VERBOSITY.min(context.config().max_log_verbosity),
        ));
        let seed = context.config().default_random_seed;
        Self {
            name,
            context,
            tree,
            run_state: RunState::new(),
            macros,
            expander,
            flow_filters: FlowFilterChain::new(),
            scope: RunScope::new(),
            random: Mutex::new(StdRng::seed_from_u64(seed as u64)),
            nesting: NestingGuard::default(),
            phase: RwLock::new(ExecutionPhase::Idle),
            logger,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_location(self, location: ProcessLocation) -> Self {
        self.macros.set_location(Some(location));
        self
    }

    pub fn with_compatibility_level(self, level: OperatorVersion) -> Self {
        self.expander.set_compatibility_level(level);
        self
    }

    pub fn with_nesting(mut self, nesting: NestingGuard) -> Self {
        self.nesting = nesting;
        self
    }

    /// Child process for a sub-process invocation: same engine context and
    /// compatibility level, nesting depth plus one, and this process's flow
    /// filters.
    pub fn nested(&self, name: impl Into<String>, tree: Arc<dyn OperatorTree>) -> Self {
        let child = Process::new(name, self.context.clone(), tree)
            .with_compatibility_level(self.compatibility_level())
            .with_nesting(self.nesting.nested());
        child.logger.set_level(self.logger.level());
        self.flow_filters.copy_to(&child.flow_filters);
        child
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<OpFlowContext> {
        &self.context
    }

    pub fn tree(&self) -> &Arc<dyn OperatorTree> {
        &self.tree
    }

    pub fn root_operator(&self) -> Arc<dyn Operator> {
        self.tree.root()
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn state(&self) -> ProcessState {
        self.run_state.state()
    }

    pub fn phase(&self) -> ExecutionPhase {
        *self.phase.read().expect("Process RwLock poisoned")
    }

    pub(crate) fn set_phase(&self, phase: ExecutionPhase) {
        *self.phase.write().expect("Process RwLock poisoned") = phase;
    }

    pub fn macros(&self) -> &Arc<MacroTable> {
        &self.macros
    }

    pub fn expander(&self) -> &MacroExpander {
        &self.expander
    }

    pub fn flow_filters(&self) -> &FlowFilterChain {
        &self.flow_filters
    }

    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    pub fn logger(&self) -> &ProcessLogger {
        &self.logger
    }

    pub fn nesting(&self) -> NestingGuard {
        self.nesting
    }

    pub fn location(&self) -> Option<ProcessLocation> {
        self.macros.location()
    }

    pub fn set_location(&self, location: Option<ProcessLocation>) {
        self.macros.set_location(location);
    }

    pub fn compatibility_level(&self) -> OperatorVersion {
        self.expander.compatibility_level()
    }

    pub fn set_compatibility_level(&self, level: OperatorVersion) {
        self.expander.set_compatibility_level(level);
    }

    /// Run `f` against this process's random stream.
    pub fn with_random<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut rng = self.random.lock().expect("Process random mutex poisoned");
        f(&mut rng)
    }

    pub(crate) fn reseed_random(&self, seed: i64) {
        *self.random.lock().expect("Process random mutex poisoned") =
            StdRng::seed_from_u64(seed as u64);
    }

    /// Request the current run to stop. Wakes a run parked at a breakpoint.
    pub fn stop(&self) {
        self.cancellation.cancel();
        self.run_state.stop();
    }

    pub fn resume(&self) {
        self.run_state.resume();
    }

    /// Park the calling walker thread at a breakpoint.
    pub fn pause(
        &self,
        operator: &dyn Operator,
        artifacts: &[ArtifactRef],
        location: BreakpointLocation,
    ) -> ProcessState {
        self.run_state.pause(operator, artifacts, location)
    }

    /// Breakpoint for tree walkers: parks like [`Process::pause`] and fails
    /// with [`OpFlowError::ProcessStopped`] when the run was stopped meanwhile.
    pub fn breakpoint(
        &self,
        operator: &dyn Operator,
        artifacts: &[ArtifactRef],
        location: BreakpointLocation,
    ) -> OpFlowResult<()> {
        self.logger.debug(&format!(
            "Breakpoint {:?} operator '{}'",
            location,
            operator.name()
        ));
        match self.pause(operator, artifacts, location) {
            ProcessState::Stopped => Err(OpFlowError::ProcessStopped),
            _ => Ok(()),
        }
    }

    /// Cooperative cancellation checkpoint for tree walkers.
    pub fn check_for_stop(&self) -> OpFlowResult<()> {
        if self.run_state.should_stop() || self.cancellation.is_cancelled() {
            Err(OpFlowError::ProcessStopped)
        } else {
            Ok(())
        }
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Expand a parameter value of `operator` (or of the process when `None`).
    pub fn expand_parameter(
        &self,
        key: &str,
        value: &str,
        operator: Option<&dyn Operator>,
    ) -> OpFlowResult<String> {
        self.expander.expand_fully(key, value, operator)
    }
}
