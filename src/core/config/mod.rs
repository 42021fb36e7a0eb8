// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Configuration
//!
//! Two layers:
//!
//! - [`EngineConfig`]: process-wide settings shared by every process created
//!   from one [`OpFlowContext`] (worker pool size, verbosity ceiling,
//!   compatibility level, random seed default).
//! - [`ExecutionContext`]: per-run settings (external input/output slots,
//!   macros and overrides, verbosity, dispatch mode, output persistence).
//!
//! Both load from TOML or YAML:
//!
//! ```rust,ignore
//! let ctx = ExecutionContext::from_file("runs/nightly.yaml")?;
//! process.run(ctx, Vec::new())?;
//! ```

pub mod macro_config;
pub mod opflow_context;
pub mod version;

pub use macro_config::MacroConfig;
pub use opflow_context::OpFlowContext;
pub use version::OperatorVersion;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{OpFlowError, OpFlowResult};
use crate::core::util::logging::LogSink;

/// Highest verbosity value; maps to `LevelFilter::Trace`.
pub const MAX_VERBOSITY: u8 = 5;
/// Verbosity used when a run does not ask for one (`Info`).
pub const DEFAULT_VERBOSITY: u8 = 3;
/// Seed of the per-run random stream when nothing else is configured.
pub const DEFAULT_RANDOM_SEED: i64 = 2001;

/// Map a verbosity integer (0 = off .. 5 = trace) to a log level.
pub fn verbosity_to_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Process-wide engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the bounded worker pool used for pooled dispatch and input loading
    pub worker_threads: usize,
    /// Ceiling applied to every run's requested verbosity
    pub max_log_verbosity: u8,
    /// Compatibility level new processes run at
    pub compatibility_level: OperatorVersion,
    /// Random seed used when a run does not supply one
    pub default_random_seed: i64,
    /// Ask the operator tree to drop cached intermediate data before each run
    pub clear_cache_on_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            max_log_verbosity: MAX_VERBOSITY,
            compatibility_level: OperatorVersion::CURRENT,
            default_random_seed: DEFAULT_RANDOM_SEED,
            clear_cache_on_run: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> OpFlowResult<Self> {
        parse_toml(content, "engine config")
    }

    pub fn from_yaml_str(content: &str) -> OpFlowResult<Self> {
        parse_yaml(content, "engine config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> OpFlowResult<Self> {
        load_file(path.as_ref())
    }
}

/// A macro declared by the execution context, applied in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub name: String,
    pub value: String,
}

impl MacroDefinition {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-run execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionContext {
    /// Artifact store locations loaded into the root input slots, by position
    pub input_locations: Vec<String>,
    /// Artifact store locations the root output slots are written to, by position
    pub output_locations: Vec<String>,
    /// Context-declared macros
    pub macros: Vec<MacroDefinition>,
    /// Caller overrides; applied after `macros` so they win
    pub macro_overrides: HashMap<String, String>,
    /// Requested verbosity (0 = off .. 5 = trace), clamped by the engine ceiling
    pub log_verbosity: Option<u8>,
    /// Dispatch the tree walk into the worker pool instead of the calling thread
    pub pooled_execution: bool,
    /// Write results to `output_locations` after a successful run
    pub persist_output: bool,
    /// Seed of this run's random stream
    pub random_seed: Option<i64>,
    /// Sink receiving this run's log records; detached when the run finishes
    #[serde(skip)]
    pub log_sink: Option<Arc<dyn LogSink>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            input_locations: Vec::new(),
            output_locations: Vec::new(),
            macros: Vec::new(),
            macro_overrides: HashMap::new(),
            log_verbosity: None,
            pooled_execution: false,
            persist_output: true,
            random_seed: None,
            log_sink: None,
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_location(mut self, location: impl Into<String>) -> Self {
        self.input_locations.push(location.into());
        self
    }

    pub fn with_output_location(mut self, location: impl Into<String>) -> Self {
        self.output_locations.push(location.into());
        self
    }

    pub fn with_macro(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.push(MacroDefinition::new(name, value));
        self
    }

    pub fn with_macro_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macro_overrides.insert(name.into(), value.into());
        self
    }

    pub fn with_log_verbosity(mut self, verbosity: u8) -> Self {
        self.log_verbosity = Some(verbosity);
        self
    }

    pub fn with_pooled_execution(mut self, pooled: bool) -> Self {
        self.pooled_execution = pooled;
        self
    }

    pub fn with_persist_output(mut self, persist: bool) -> Self {
        self.persist_output = persist;
        self
    }

    pub fn with_random_seed(mut self, seed: i64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Requested verbosity clamped against `max_verbosity`.
    pub fn effective_verbosity(&self, max_verbosity: u8) -> u8 {
        self.log_verbosity
            .unwrap_or(DEFAULT_VERBOSITY)
            .min(max_verbosity)
            .min(MAX_VERBOSITY)
    }

    pub fn from_toml_str(content: &str) -> OpFlowResult<Self> {
        parse_toml(content, "execution context")
    }

    pub fn from_yaml_str(content: &str) -> OpFlowResult<Self> {
        parse_yaml(content, "execution context")
    }

    pub fn from_file(path: impl AsRef<Path>) -> OpFlowResult<Self> {
        load_file(path.as_ref())
    }
}

fn parse_toml<T: DeserializeOwned>(content: &str, what: &str) -> OpFlowResult<T> {
    toml::from_str(content)
        .map_err(|e| OpFlowError::configuration(format!("Invalid TOML {what}: {e}")))
}

fn parse_yaml<T: DeserializeOwned>(content: &str, what: &str) -> OpFlowResult<T> {
    serde_yaml::from_str(content)
        .map_err(|e| OpFlowError::configuration(format!("Invalid YAML {what}: {e}")))
}

fn load_file<T: DeserializeOwned>(path: &Path) -> OpFlowResult<T> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| {
        OpFlowError::configuration_with_key(format!("Cannot read config file: {e}"), &display)
    })?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("toml") => parse_toml(&content, &display),
        Some("yaml") | Some("yml") => parse_yaml(&content, &display),
        _ => Err(OpFlowError::configuration_with_key(
            "Unsupported config file extension. Valid values: 'toml', 'yaml', 'yml'",
            display,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_execution_context_defaults() {
        let ctx = ExecutionContext::default();
        assert!(ctx.persist_output);
        assert!(!ctx.pooled_execution);
        assert_eq!(ctx.effective_verbosity(MAX_VERBOSITY), DEFAULT_VERBOSITY);
    }

    #[test]
    fn test_verbosity_is_clamped() {
        let ctx = ExecutionContext::new().with_log_verbosity(5);
        assert_eq!(ctx.effective_verbosity(2), 2);
        let ctx = ExecutionContext::new().with_log_verbosity(42);
        assert_eq!(ctx.effective_verbosity(200), MAX_VERBOSITY);
        assert_eq!(verbosity_to_level(2), LevelFilter::Warn);
    }

    #[test]
    fn test_execution_context_from_toml() {
        let ctx = ExecutionContext::from_toml_str(
            r#"
            input_locations = ["//repo/data/golf"]
            pooled_execution = true
            log_verbosity = 4

            [[macros]]
            name = "region"
            value = "emea"

            [macro_overrides]
            region = "apac"
            "#,
        )
        .unwrap();
        assert_eq!(ctx.input_locations, vec!["//repo/data/golf".to_string()]);
        assert!(ctx.pooled_execution);
        assert!(ctx.persist_output);
        assert_eq!(ctx.macros, vec![MacroDefinition::new("region", "emea")]);
        assert_eq!(ctx.macro_overrides.get("region").map(String::as_str), Some("apac"));
    }

    #[test]
    fn test_engine_config_from_yaml() {
        let config = EngineConfig::from_yaml_str(
            "worker_threads: 2\nmax_log_verbosity: 3\ncompatibility_level: \"6.0.2\"\n",
        )
        .unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.compatibility_level, OperatorVersion::new(6, 0, 2));
        assert_eq!(config.default_random_seed, DEFAULT_RANDOM_SEED);
    }

    #[test]
    fn test_from_file_dispatches_on_extension() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "output_locations: [\"//repo/results/model\"]").unwrap();
        let ctx = ExecutionContext::from_file(file.path()).unwrap();
        assert_eq!(ctx.output_locations.len(), 1);

        let other = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ExecutionContext::from_file(other.path()).unwrap_err();
        assert!(matches!(err, OpFlowError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = ExecutionContext::from_toml_str("pooled_execution = 'maybe'").unwrap_err();
        assert!(matches!(err, OpFlowError::Configuration { .. }));
    }
}
