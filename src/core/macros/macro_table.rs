// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread-safe macro store with predefined, computed names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::config::macro_config::{
    EXECUTION_COUNT, EXECUTION_COUNT_NEXT, OPERATOR_CLASS, OPERATOR_NAME, PROCESS_FILE,
    PROCESS_NAME, PROCESS_PATH, PROCESS_START, TEMP_DIR,
};
use crate::core::config::MacroConfig;
use crate::core::macros::formatter::TimestampFormatter;
use crate::core::operator::Operator;

/// Where a process was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLocation {
    /// Process file on disk
    File(PathBuf),
    /// Entry in an artifact repository, e.g. `//Local/processes/Churn`
    Repository(String),
}

impl ProcessLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn repository(location: impl Into<String>) -> Self {
        Self::Repository(location.into())
    }

    /// Display name: file name, or last repository path segment.
    pub fn short_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Repository(location) => location
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(location)
                .to_string(),
        }
    }

    /// Short name, minus its last extension for file-backed processes.
    pub fn process_name(&self) -> String {
        let short = self.short_name();
        match self {
            Self::File(_) => match short.rfind('.') {
                Some(idx) if idx > 0 => short[..idx].to_string(),
                _ => short,
            },
            Self::Repository(_) => short,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Repository(location) => location.clone(),
        }
    }
}

/// Mutation reported to macro listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroChange {
    Set { name: String, value: String },
    Removed { name: String },
    Cleared,
}

pub trait MacroListener: Send + Sync {
    fn macros_changed(&self, change: &MacroChange);
}

impl<F> MacroListener for F
where
    F: Fn(&MacroChange) + Send + Sync,
{
    fn macros_changed(&self, change: &MacroChange) {
        self(change)
    }
}

/// User macros plus the predefined names computed from process and operator state.
///
/// Operator-independent predefined names shadow same-named user macros
/// whenever they have a value. Location-derived names fall back to the user
/// map while the process has no location. `process_start` reads the user map
/// first so the value seeded at run start (or a caller override) is reported.
pub struct MacroTable {
    config: Arc<MacroConfig>,
    macros: Mutex<HashMap<String, String>>,
    location: RwLock<Option<ProcessLocation>>,
    listeners: RwLock<Vec<Arc<dyn MacroListener>>>,
    start_formatter: TimestampFormatter,
}

impl std::fmt::Debug for MacroTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroTable")
            .field("macros", &self.definitions())
            .field("location", &self.location())
            .finish()
    }
}

impl MacroTable {
    pub fn new(config: Arc<MacroConfig>) -> Self {
        let start_formatter = TimestampFormatter::new(config.start_time_pattern);
        Self {
            config,
            macros: Mutex::new(HashMap::new()),
            location: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            start_formatter,
        }
    }

    pub fn config(&self) -> &Arc<MacroConfig> {
        &self.config
    }

    pub fn set_location(&self, location: Option<ProcessLocation>) {
        *self.location.write().expect("MacroTable RwLock poisoned") = location;
    }

    pub fn location(&self) -> Option<ProcessLocation> {
        self.location
            .read()
            .expect("MacroTable RwLock poisoned")
            .clone()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Set a user macro. Empty names are ignored.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        if name.is_empty() {
            return;
        }
        let value = value.into();
        self.lock().insert(name.to_string(), value.clone());
        self.notify(&MacroChange::Set {
            name: name.to_string(),
            value,
        });
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        let removed = self.lock().remove(name);
        if removed.is_some() {
            self.notify(&MacroChange::Removed {
                name: name.to_string(),
            });
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.notify(&MacroChange::Cleared);
    }

    /// Whether `name` resolves, either as a user macro or a predefined name.
    pub fn is_set(&self, name: &str, operator: Option<&dyn Operator>) -> bool {
        self.lock().contains_key(name)
            || self.config.is_operator_independent(name)
            || (operator.is_some() && self.config.is_operator_dependent(name))
    }

    /// Resolve `name` without operator context.
    pub fn get(&self, name: &str) -> Option<String> {
        if self.config.is_operator_independent(name) {
            return match name {
                PROCESS_NAME | PROCESS_FILE | PROCESS_PATH => match self.location() {
                    Some(location) => Some(match name {
                        PROCESS_NAME => location.process_name(),
                        PROCESS_FILE => location.short_name(),
                        _ => location.path(),
                    }),
                    None => self.get_user(name),
                },
                PROCESS_START => Some(
                    self.get_user(PROCESS_START)
                        .unwrap_or_else(|| self.start_formatter.now()),
                ),
                TEMP_DIR => Some(self.config.temp_dir.display().to_string()),
                _ => self.get_user(name),
            };
        }
        self.get_user(name)
    }

    /// Resolve `name`, trying operator-scoped names first when an operator is given.
    pub fn get_with_operator(&self, name: &str, operator: Option<&dyn Operator>) -> Option<String> {
        if let Some(op) = operator {
            if self.config.is_operator_dependent(name) {
                let resolved = match name {
                    OPERATOR_NAME => Some(op.name().to_string()),
                    OPERATOR_CLASS => Some(op.class_name().to_string()),
                    EXECUTION_COUNT => Some(op.applied_count().to_string()),
                    EXECUTION_COUNT_NEXT => Some(op.applied_count().saturating_add(1).to_string()),
                    _ => None,
                };
                if resolved.is_some() {
                    return resolved;
                }
            }
        }
        self.get(name)
    }

    /// Raw user macro value, bypassing predefined names.
    pub fn get_user(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// User macros sorted by name.
    pub fn definitions(&self) -> Vec<(String, String)> {
        let mut defs: Vec<(String, String)> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        defs.sort();
        defs
    }

    /// Current time in the `process_start` format.
    pub fn format_start_time(&self) -> String {
        self.start_formatter.now()
    }

    pub fn add_listener(&self, listener: Arc<dyn MacroListener>) {
        let mut listeners = self.listeners.write().expect("MacroTable RwLock poisoned");
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MacroListener>) {
        self.listeners
            .write()
            .expect("MacroTable RwLock poisoned")
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.macros.lock().expect("MacroTable mutex poisoned")
    }

    fn notify(&self, change: &MacroChange) {
        let listeners = self
            .listeners
            .read()
            .expect("MacroTable RwLock poisoned")
            .clone();
        for listener in listeners {
            listener.macros_changed(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Op;

    impl Operator for Op {
        fn name(&self) -> &str {
            "Read CSV"
        }
        fn class_name(&self) -> &str {
            "read_csv"
        }
        fn applied_count(&self) -> u64 {
            4
        }
    }

    fn table() -> MacroTable {
        MacroTable::new(Arc::new(MacroConfig::default().with_temp_dir("/tmp/opflow")))
    }

    #[test]
    fn test_set_ignores_empty_name() {
        let table = table();
        table.set("", "value");
        assert!(table.definitions().is_empty());
    }

    #[test]
    fn test_predefined_shadows_user_macro() {
        let table = table();
        table.set_location(Some(ProcessLocation::file("/work/churn.model.rmp")));
        table.set(PROCESS_NAME, "user value");
        assert_eq!(table.get(PROCESS_NAME).as_deref(), Some("churn.model"));
        assert_eq!(table.get_user(PROCESS_NAME).as_deref(), Some("user value"));
    }

    #[test]
    fn test_location_derived_macros() {
        let table = table();
        table.set_location(Some(ProcessLocation::repository("//Local/processes/Churn")));
        assert_eq!(table.get(PROCESS_NAME).as_deref(), Some("Churn"));
        assert_eq!(table.get(PROCESS_FILE).as_deref(), Some("Churn"));
        assert_eq!(table.get(PROCESS_PATH).as_deref(), Some("//Local/processes/Churn"));

        table.set_location(None);
        assert_eq!(table.get(PROCESS_NAME), None);
    }

    #[test]
    fn test_unsaved_process_falls_back_to_user_macro() {
        let table = table();
        table.set(PROCESS_NAME, "draft");
        table.set(PROCESS_PATH, "/drafts/draft");
        assert_eq!(table.get(PROCESS_NAME).as_deref(), Some("draft"));
        assert_eq!(table.get(PROCESS_PATH).as_deref(), Some("/drafts/draft"));
        assert_eq!(table.get(PROCESS_FILE), None);

        table.set_location(Some(ProcessLocation::file("/work/churn.rmp")));
        assert_eq!(table.get(PROCESS_NAME).as_deref(), Some("churn"));
    }

    #[test]
    fn test_start_time_prefers_seeded_value() {
        let table = table();
        assert!(table.get(PROCESS_START).is_some());
        table.set(PROCESS_START, "yesterday");
        assert_eq!(table.get(PROCESS_START).as_deref(), Some("yesterday"));
    }

    #[test]
    fn test_temp_dir() {
        let table = table();
        assert_eq!(table.get(TEMP_DIR).as_deref(), Some("/tmp/opflow"));
    }

    #[test]
    fn test_operator_scoped_lookup() {
        let table = table();
        let op = Op;
        assert_eq!(table.get_with_operator(OPERATOR_NAME, Some(&op)).as_deref(), Some("Read CSV"));
        assert_eq!(table.get_with_operator(OPERATOR_CLASS, Some(&op)).as_deref(), Some("read_csv"));
        assert_eq!(table.get_with_operator(EXECUTION_COUNT, Some(&op)).as_deref(), Some("4"));
        assert_eq!(table.get_with_operator(EXECUTION_COUNT_NEXT, Some(&op)).as_deref(), Some("5"));
        assert_eq!(table.get_with_operator(OPERATOR_NAME, None), None);

        table.set("region", "emea");
        assert_eq!(table.get_with_operator("region", Some(&op)).as_deref(), Some("emea"));
    }

    #[test]
    fn test_next_count_saturates() {
        struct Busy;
        impl Operator for Busy {
            fn name(&self) -> &str {
                "Loop"
            }
            fn class_name(&self) -> &str {
                "loop"
            }
            fn applied_count(&self) -> u64 {
                u64::MAX
            }
        }
        let table = table();
        assert_eq!(
            table.get_with_operator(EXECUTION_COUNT_NEXT, Some(&Busy)),
            Some(u64::MAX.to_string())
        );
    }

    #[test]
    fn test_is_set() {
        let table = table();
        let op = Op;
        table.set("region", "emea");
        assert!(table.is_set("region", None));
        assert!(table.is_set(PROCESS_NAME, None));
        assert!(!table.is_set(OPERATOR_NAME, None));
        assert!(table.is_set(OPERATOR_NAME, Some(&op)));
        assert!(!table.is_set("missing", Some(&op)));
    }

    #[test]
    fn test_listeners_see_every_mutation() {
        let table = table();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn MacroListener> =
            Arc::new(move |change: &MacroChange| sink.lock().unwrap().push(change.clone()));
        table.add_listener(listener.clone());
        table.add_listener(listener.clone());

        table.set("a", "1");
        table.remove("a");
        table.remove("a");
        table.clear();
        table.remove_listener(&listener);
        table.set("b", "2");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                MacroChange::Set {
                    name: "a".to_string(),
                    value: "1".to_string()
                },
                MacroChange::Removed {
                    name: "a".to_string()
                },
                MacroChange::Cleared,
            ]
        );
    }
}
