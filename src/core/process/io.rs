// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading of external inputs and persisting of external outputs.

use crate::core::config::ExecutionContext;
use crate::core::error::{OpFlowError, OpFlowResult};
use crate::core::macros::unescape;
use crate::core::operator::ArtifactRef;
use crate::core::process::Process;
use crate::core::store::StoreEntry;
use crate::core::util::executor_service::{CancellationToken, TaskError};

impl Process {
    /// Fetch the artifacts configured for input slots `first_slot..` from the
    /// artifact store.
    ///
    /// Runs on the worker pool under the run's cancellation token; a stop
    /// observed while loading surfaces as [`OpFlowError::ProcessStopped`].
    /// Returns `(slot, artifact)` pairs for connected slots only.
    pub fn load_initial_input(
        &self,
        ctx: &ExecutionContext,
        first_slot: usize,
    ) -> OpFlowResult<Vec<(usize, ArtifactRef)>> {
        if ctx.input_locations.len() <= first_slot {
            return Ok(Vec::new());
        }
        self.context
            .executor()
            .run_cancellable(self.cancellation(), |token| {
                self.load_slots(ctx, first_slot, token)
            })
            .map_err(|e| match e {
                TaskError::Cancelled => OpFlowError::ProcessStopped,
                TaskError::Failed(error) => error,
            })
    }

    fn load_slots(
        &self,
        ctx: &ExecutionContext,
        first_slot: usize,
        token: &CancellationToken,
    ) -> OpFlowResult<Vec<(usize, ArtifactRef)>> {
        let store = self.context.artifact_store();
        let ports = self.tree.input_port_count();
        let mut loaded = Vec::new();
        for (slot, location) in ctx.input_locations.iter().enumerate().skip(first_slot) {
            if token.is_cancelled() {
                return Err(OpFlowError::ProcessStopped);
            }
            if location.trim().is_empty() {
                continue;
            }
            if slot >= ports {
                return Err(OpFlowError::slot_error(
                    format!(
                        "Input location '{location}' is configured for slot {slot} but the process declares only {ports} input ports"
                    ),
                    slot,
                ));
            }
            let location = self.expand_location(&format!("input_location[{slot}]"), location)?;
            let handle = store
                .resolve(&location)
                .map_err(|e| OpFlowError::slot_error(format!("Cannot resolve input location: {e}"), slot))?;
            let artifact = match store.fetch(&handle)? {
                None => {
                    return Err(OpFlowError::slot_error(
                        format!("No artifact stored at '{handle}'"),
                        slot,
                    ))
                }
                Some(StoreEntry::Artifact(artifact)) => artifact,
                Some(other) => {
                    return Err(OpFlowError::slot_error(
                        format!("Entry at '{handle}' is a {}, not an artifact", other.kind()),
                        slot,
                    ))
                }
            };
            if self.tree.is_input_connected(slot) {
                self.logger.info(&format!(
                    "Loaded {} from '{handle}' into input slot {slot}",
                    artifact.kind()
                ));
                loaded.push((slot, artifact));
            } else {
                self.logger.debug(&format!(
                    "Input slot {slot} is not connected; '{handle}' not delivered"
                ));
            }
        }
        Ok(loaded)
    }

    /// Write results to the configured output locations.
    ///
    /// Slots without a result and locations past the declared output ports
    /// are skipped with a warning.
    pub fn save_results(
        &self,
        ctx: &ExecutionContext,
        outputs: &[Option<ArtifactRef>],
    ) -> OpFlowResult<()> {
        let store = self.context.artifact_store();
        let ports = self.tree.output_port_count();
        for (slot, location) in ctx.output_locations.iter().enumerate() {
            if location.trim().is_empty() {
                continue;
            }
            if slot >= ports {
                self.logger.warn(&format!(
                    "Output location '{location}' is configured for slot {slot} but the process declares only {ports} output ports; skipped"
                ));
                continue;
            }
            let result = match outputs.get(slot) {
                Some(Some(artifact)) if self.tree.is_output_connected(slot) => artifact,
                _ => {
                    self.logger.warn(&format!(
                        "No result at output slot {slot}; nothing written to '{location}'"
                    ));
                    continue;
                }
            };
            let location = self.expand_location(&format!("output_location[{slot}]"), location)?;
            let handle = store.resolve(&location)?;
            store.store(result.clone(), &handle)?;
            self.logger
                .info(&format!("Saved {} to '{handle}'", result.kind()));
        }
        Ok(())
    }

    fn expand_location(&self, key: &str, location: &str) -> OpFlowResult<String> {
        let expanded = self.expander().expand(key, location)?;
        Ok(unescape(&expanded))
    }
}
