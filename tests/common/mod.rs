// SPDX-License-Identifier: MIT OR Apache-2.0

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opflow::core::config::{EngineConfig, OpFlowContext};
use opflow::core::error::{OpFlowError, OpFlowResult};
use opflow::core::flow::ProcessFlowFilter;
use opflow::core::operator::{Artifact, ArtifactRef, Operator, OperatorTree, OperatorValue};
use opflow::core::process::Process;
use opflow::core::state::BreakpointLocation;
use opflow::core::statistics::ExecutionStatistics;
use opflow::core::store::InMemoryArtifactStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestArtifact {
    pub kind: String,
    pub payload: String,
}

impl TestArtifact {
    pub fn arc(kind: &str, payload: &str) -> ArtifactRef {
        Arc::new(Self {
            kind: kind.to_string(),
            payload: payload.to_string(),
        })
    }
}

impl Artifact for TestArtifact {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn payload(artifact: &ArtifactRef) -> String {
    artifact
        .as_any()
        .downcast_ref::<TestArtifact>()
        .map(|a| a.payload.clone())
        .unwrap_or_default()
}

pub type Action =
    Box<dyn Fn(&Process, &TestOperator, Vec<ArtifactRef>) -> OpFlowResult<Vec<ArtifactRef>> + Send + Sync>;

pub struct TestOperator {
    name: String,
    class: String,
    enabled: bool,
    applied: AtomicU64,
    dirty: AtomicBool,
    values: Mutex<HashMap<String, OperatorValue>>,
    action: Action,
}

impl TestOperator {
    /// Operator passing its inputs through unchanged.
    pub fn passthrough(name: &str) -> Self {
        Self::with_action(name, Box::new(|_, _, inputs| Ok(inputs)))
    }

    pub fn with_action(name: &str, action: Action) -> Self {
        Self {
            name: name.to_string(),
            class: "test_operator".to_string(),
            enabled: true,
            applied: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            values: Mutex::new(HashMap::new()),
            action,
        }
    }

    pub fn failing(name: &str, error: fn() -> OpFlowError) -> Self {
        Self::with_action(name, Box::new(move |_, _, _| Err(error())))
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn set_value(&self, name: &str, value: OperatorValue) {
        self.values.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn apply(&self, process: &Process, inputs: Vec<ArtifactRef>) -> OpFlowResult<Vec<ArtifactRef>> {
        let outputs = (self.action)(process, self, inputs)?;
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
        Ok(outputs)
    }
}

impl Operator for TestOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn value(&self, name: &str) -> Option<OperatorValue> {
        self.values.lock().unwrap().get(name).cloned()
    }
}

/// Walks its operators in order, feeding each one the previous outputs.
pub struct SequentialTree {
    root: Arc<TestOperator>,
    operators: Vec<Arc<TestOperator>>,
    input_ports: usize,
    output_ports: usize,
    disconnected_inputs: Vec<usize>,
    breakpoints: Mutex<HashMap<String, BreakpointLocation>>,
    pub teardowns: AtomicUsize,
    pub cache_clears: AtomicUsize,
    pub worker_threads: Mutex<Vec<String>>,
}

impl SequentialTree {
    pub fn new(operators: Vec<TestOperator>) -> Self {
        Self {
            root: Arc::new(TestOperator::passthrough("Process")),
            operators: operators.into_iter().map(Arc::new).collect(),
            input_ports: 0,
            output_ports: 1,
            disconnected_inputs: Vec::new(),
            breakpoints: Mutex::new(HashMap::new()),
            teardowns: AtomicUsize::new(0),
            cache_clears: AtomicUsize::new(0),
            worker_threads: Mutex::new(Vec::new()),
        }
    }

    pub fn ports(mut self, inputs: usize, outputs: usize) -> Self {
        self.input_ports = inputs;
        self.output_ports = outputs;
        self
    }

    pub fn disconnect_input(mut self, slot: usize) -> Self {
        self.disconnected_inputs.push(slot);
        self
    }

    pub fn set_breakpoint(&self, operator: &str, location: BreakpointLocation) {
        self.breakpoints
            .lock()
            .unwrap()
            .insert(operator.to_string(), location);
    }

    pub fn operator(&self, name: &str) -> Arc<TestOperator> {
        self.operators
            .iter()
            .find(|op| op.name == name)
            .cloned()
            .unwrap()
    }

    fn breakpoint_at(&self, name: &str) -> Option<BreakpointLocation> {
        self.breakpoints.lock().unwrap().get(name).copied()
    }
}

impl OperatorTree for SequentialTree {
    fn root(&self) -> Arc<dyn Operator> {
        self.root.clone()
    }

    fn operators(&self) -> Vec<Arc<dyn Operator>> {
        self.operators
            .iter()
            .map(|op| op.clone() as Arc<dyn Operator>)
            .collect()
    }

    fn input_port_count(&self) -> usize {
        self.input_ports
    }

    fn is_input_connected(&self, index: usize) -> bool {
        index < self.input_ports && !self.disconnected_inputs.contains(&index)
    }

    fn output_port_count(&self) -> usize {
        self.output_ports
    }

    fn is_output_connected(&self, index: usize) -> bool {
        index < self.output_ports
    }

    fn execute(
        &self,
        process: &Process,
        inputs: Vec<Option<ArtifactRef>>,
    ) -> OpFlowResult<Vec<Option<ArtifactRef>>> {
        if let Some(name) = std::thread::current().name() {
            self.worker_threads.lock().unwrap().push(name.to_string());
        }
        let enabled: Vec<Arc<TestOperator>> = self
            .operators
            .iter()
            .filter(|op| op.enabled)
            .cloned()
            .collect();
        let mut data: Vec<ArtifactRef> = inputs.into_iter().flatten().collect();
        for index in 0..enabled.len() {
            process.check_for_stop()?;
            let op: &TestOperator = &enabled[index];
            let previous = index
                .checked_sub(1)
                .map(|i| &*enabled[i] as &dyn Operator);
            let next = enabled.get(index + 1).map(|o| &**o as &dyn Operator);

            if self.breakpoint_at(&op.name) == Some(BreakpointLocation::Before) {
                process.breakpoint(op, &data, BreakpointLocation::Before)?;
            }
            process.flow_filters().before(previous, op, Some(&data))?;
            data = op.apply(process, data)?;
            process.flow_filters().after(op, next, Some(&data))?;
            if self.breakpoint_at(&op.name) == Some(BreakpointLocation::After) {
                process.breakpoint(op, &data, BreakpointLocation::After)?;
            }
        }
        let mut outputs: Vec<Option<ArtifactRef>> = vec![None; self.output_ports];
        for (slot, artifact) in data.into_iter().take(self.output_ports).enumerate() {
            outputs[slot] = Some(artifact);
        }
        Ok(outputs)
    }

    fn clear_cached_data(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown(&self) -> OpFlowResult<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Flow filter appending `"<phase>:<id>:<operator>"` entries to a shared log
pub struct RecordingFilter {
    pub id: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail_with: Option<fn() -> OpFlowError>,
    pub panic: bool,
}

impl RecordingFilter {
    pub fn new(id: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id,
            log: log.clone(),
            fail_with: None,
            panic: false,
        }
    }

    pub fn failing(mut self, error: fn() -> OpFlowError) -> Self {
        self.fail_with = Some(error);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    fn act(&self, phase: &str, operator: &dyn Operator) -> OpFlowResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{phase}:{}:{}", self.id, operator.name()));
        if self.panic {
            panic!("filter {} panicked", self.id);
        }
        match self.fail_with {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }
}

impl ProcessFlowFilter for RecordingFilter {
    fn pre_operator(
        &self,
        _previous: Option<&dyn Operator>,
        next: &dyn Operator,
        _inputs: &[ArtifactRef],
    ) -> OpFlowResult<()> {
        self.act("pre", next)
    }

    fn post_operator(
        &self,
        previous: &dyn Operator,
        _next: Option<&dyn Operator>,
        _outputs: &[ArtifactRef],
    ) -> OpFlowResult<()> {
        self.act("post", previous)
    }
}

pub struct Engine {
    pub context: Arc<OpFlowContext>,
    pub statistics: Arc<ExecutionStatistics>,
    pub store: Arc<InMemoryArtifactStore>,
}

pub fn engine() -> Engine {
    engine_with(EngineConfig {
        worker_threads: 2,
        ..EngineConfig::default()
    })
}

pub fn engine_with(config: EngineConfig) -> Engine {
    let statistics = Arc::new(ExecutionStatistics::new());
    let store = Arc::new(InMemoryArtifactStore::new());
    let context = OpFlowContext::new(config)
        .unwrap()
        .with_statistics(statistics.clone())
        .with_artifact_store(store.clone());
    Engine {
        context: Arc::new(context),
        statistics,
        store,
    }
}
