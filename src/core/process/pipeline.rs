// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::core::config::macro_config::PROCESS_START;
use crate::core::config::{verbosity_to_level, ExecutionContext};
use crate::core::error::{FailureKind, OpFlowError, OpFlowResult};
use crate::core::license::verify_operators;
use crate::core::operator::ArtifactRef;
use crate::core::process::{ExecutionPhase, Process};
use crate::core::statistics::StatisticsEvent;
use crate::core::util::executor_service::TaskError;

/// Runs `Process::finish` however the run ends, including unwinding.
struct FinishGuard<'a> {
    process: &'a Process,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.process.finish();
    }
}

impl Process {
    /// Execute one run.
    ///
    /// `inputs` fill the root input slots from slot 0; slots past them are
    /// loaded from `ctx.input_locations`. Returns one entry per root output
    /// slot.
    pub fn run(
        &self,
        ctx: ExecutionContext,
        inputs: Vec<ArtifactRef>,
    ) -> OpFlowResult<Vec<Option<ArtifactRef>>> {
        let run_id = Uuid::new_v4();
        let verbosity = ctx.effective_verbosity(self.context.config().max_log_verbosity);
        self.logger.set_level(verbosity_to_level(verbosity));
        if let Some(sink) = &ctx.log_sink {
            self.logger.attach_sink(sink.clone());
        }

        let _finish = FinishGuard { process: self };
        self.cancellation.reset();
        self.run_state.start();
        self.logger.info(&format!("Process starts (run {run_id})"));
        self.context.statistics().record(&StatisticsEvent::Started {
            run_id,
            process: self.name.clone(),
        });

        match self.run_phases(&ctx, inputs) {
            Ok(outputs) => {
                self.set_phase(ExecutionPhase::Finished);
                self.context.statistics().record(&StatisticsEvent::Succeeded {
                    run_id,
                    process: self.name.clone(),
                });
                self.logger.info("Process finished successfully");
                Ok(outputs)
            }
            Err(error) => {
                let error = self.prefer_stop(error);
                self.set_phase(match error.failure_kind() {
                    FailureKind::Stopped => ExecutionPhase::Stopped,
                    _ => ExecutionPhase::Failed,
                });
                self.context
                    .statistics()
                    .record(&StatisticsEvent::for_failure(run_id, &self.name, &error));
                match error.failure_kind() {
                    FailureKind::Stopped => self.logger.info("Process stopped"),
                    FailureKind::UserError => {
                        self.logger.error(&format!("Process failed: {error}"))
                    }
                    FailureKind::OperatorException => self
                        .logger
                        .error(&format!("Process failed with operator exception: {error}")),
                }
                Err(error)
            }
        }
    }

    fn run_phases(
        &self,
        ctx: &ExecutionContext,
        inputs: Vec<ArtifactRef>,
    ) -> OpFlowResult<Vec<Option<ArtifactRef>>> {
        self.set_phase(ExecutionPhase::Preparing);
        self.prepare(ctx);

        self.set_phase(ExecutionPhase::LoadingInput);
        let first_slot = inputs.len();
        let mut slots = self.place_inputs(inputs);
        for (slot, artifact) in self.load_initial_input(ctx, first_slot)? {
            slots[slot] = Some(artifact);
        }
        self.check_for_stop()?;

        self.set_phase(ExecutionPhase::Executing);
        let outputs = self.execute(ctx, slots)?;

        if ctx.persist_output {
            self.set_phase(ExecutionPhase::Saving);
            self.save_results(ctx, &outputs)?;
        }
        Ok(outputs)
    }

    /// Reset per-run state: scope, macros, random stream, optionally cached
    /// data, and the start-time macro.
    pub(crate) fn prepare(&self, ctx: &ExecutionContext) {
        self.scope.reset();
        self.macros.clear();
        self.macros.set(PROCESS_START, self.macros.format_start_time());
        for definition in &ctx.macros {
            self.macros.set(&definition.name, definition.value.clone());
        }
        for (name, value) in &ctx.macro_overrides {
            self.macros.set(name, value.clone());
        }
        self.reseed_random(
            ctx.random_seed
                .unwrap_or(self.context.config().default_random_seed),
        );
        if self.context.config().clear_cache_on_run {
            self.logger.debug("Clearing cached data");
            self.tree.clear_cached_data();
        }
    }

    fn place_inputs(&self, inputs: Vec<ArtifactRef>) -> Vec<Option<ArtifactRef>> {
        let ports = self.tree.input_port_count();
        if inputs.len() > ports {
            self.logger.warn(&format!(
                "{} inputs supplied but the process declares {} input ports; extra inputs ignored",
                inputs.len(),
                ports
            ));
        }
        let mut slots: Vec<Option<ArtifactRef>> = vec![None; ports];
        for (slot, artifact) in inputs.into_iter().take(ports).enumerate() {
            slots[slot] = Some(artifact);
        }
        slots
    }

    /// License check, dirty marking and dispatch of the tree walk.
    pub(crate) fn execute(
        &self,
        ctx: &ExecutionContext,
        inputs: Vec<Option<ArtifactRef>>,
    ) -> OpFlowResult<Vec<Option<ArtifactRef>>> {
        let operators = self.tree.operators();
        verify_operators(self.context.license_check().as_ref(), &operators)?;
        for operator in operators.iter().filter(|op| op.is_enabled()) {
            operator.mark_dirty();
        }

        let result = if ctx.pooled_execution {
            self.logger.debug(&format!(
                "Dispatching into worker pool '{}'",
                self.context.executor().name()
            ));
            self.context
                .executor()
                .run_cancellable(&self.cancellation, |_| self.tree.execute(self, inputs))
                .map_err(|e| match e {
                    TaskError::Cancelled => OpFlowError::ProcessStopped,
                    TaskError::Failed(error) => error,
                })
        } else {
            self.tree.execute(self, inputs)
        };
        result.map_err(|e| self.prefer_stop(e))
    }

    /// A requested stop wins over whatever failure the run produced meanwhile.
    fn prefer_stop(&self, error: OpFlowError) -> OpFlowError {
        if !error.is_stop() && self.cancellation.is_cancelled() {
            self.logger
                .debug(&format!("Discarding failure after stop request: {error}"));
            OpFlowError::ProcessStopped
        } else {
            error
        }
    }

    /// Teardown that follows every run.
    pub(crate) fn finish(&self) {
        self.run_state.stop();
        if let Err(e) = self.tree.teardown() {
            self.logger.error(&format!("Teardown failed: {e}"));
        }
        self.logger.detach_sink();
        self.context.run_cleanup_hooks();
    }
}
