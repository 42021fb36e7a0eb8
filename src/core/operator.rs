// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Operator Contracts
//!
//! The engine does not define operators, their type system or the tree that
//! connects them. It consumes them through the narrow traits below:
//!
//! - [`Operator`]: an executable node, opaque beyond its name, class,
//!   applied count, enabled/dirty flags and published values
//! - [`OperatorLookup`]: name resolution used by `%{v[Op.value]}`
//! - [`OperatorTree`]: the root, its external ports and the tree walk
//! - [`Artifact`]: an object flowing between operators or loaded/stored
//!   through an artifact store
//!
//! Tree walkers are expected to poll [`Process::check_for_stop`] (or
//! `run_state().should_stop()` / `should_pause()`) between operators and to
//! notify the process flow filters around each operator.
//!
//! [`Process::check_for_stop`]: crate::core::process::Process::check_for_stop

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::error::OpFlowResult;
use crate::core::process::Process;

/// Object produced or consumed by operators
pub trait Artifact: fmt::Debug + Send + Sync {
    /// Short type name, e.g. `"ExampleSet"` or `"Model"`
    fn kind(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

pub type ArtifactRef = Arc<dyn Artifact>;

/// A value an operator publishes, e.g. its last performance figure
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorValue {
    Numeric(f64),
    Nominal(String),
}

/// Executable node of a process tree
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    /// Implementation class shown by `%{c}` / `%{operator_class}`
    fn class_name(&self) -> &str;

    /// How often the operator has been applied in this run
    fn applied_count(&self) -> u64;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Invalidate cached results so the next run re-executes the operator
    fn mark_dirty(&self) {}

    /// Published value named `name`, if any
    fn value(&self, _name: &str) -> Option<OperatorValue> {
        None
    }

    /// Key checked against the license blacklist
    fn license_key(&self) -> &str {
        self.class_name()
    }
}

impl fmt::Debug for dyn Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name())
            .field("class", &self.class_name())
            .field("applied_count", &self.applied_count())
            .finish()
    }
}

/// Resolve operators by name
pub trait OperatorLookup: Send + Sync {
    fn find_operator(&self, name: &str) -> Option<Arc<dyn Operator>>;
}

/// The operator tree of a process together with its walker
pub trait OperatorTree: Send + Sync {
    fn root(&self) -> Arc<dyn Operator>;

    /// Every operator in the tree, enabled or not
    fn operators(&self) -> Vec<Arc<dyn Operator>>;

    fn find_operator(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators().into_iter().find(|op| op.name() == name)
    }

    /// Number of external input slots declared by the root
    fn input_port_count(&self) -> usize;

    /// Whether input slot `index` feeds anything downstream
    fn is_input_connected(&self, index: usize) -> bool;

    /// Number of external output slots declared by the root
    fn output_port_count(&self) -> usize;

    /// Whether output slot `index` is fed by anything upstream
    fn is_output_connected(&self, index: usize) -> bool;

    /// Walk the tree from the root. `inputs` has one entry per input slot.
    /// Returns one entry per output slot.
    fn execute(
        &self,
        process: &Process,
        inputs: Vec<Option<ArtifactRef>>,
    ) -> OpFlowResult<Vec<Option<ArtifactRef>>>;

    /// Drop cached intermediate data
    fn clear_cached_data(&self) {}

    /// Release per-run resources; called once when a run finishes, whatever the outcome
    fn teardown(&self) -> OpFlowResult<()> {
        Ok(())
    }
}

/// [`OperatorLookup`] backed by an operator tree
#[derive(Clone)]
pub struct TreeLookup(pub Arc<dyn OperatorTree>);

impl OperatorLookup for TreeLookup {
    fn find_operator(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.0.find_operator(name)
    }
}
