// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run collections reset when a run is prepared.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::core::operator::ArtifactRef;

pub type TransientObject = Arc<dyn Any + Send + Sync>;

/// Logged data tables, report streams and transient objects of one run
#[derive(Default)]
pub struct RunScope {
    data_tables: Mutex<BTreeMap<String, ArtifactRef>>,
    report_streams: Mutex<BTreeMap<String, Vec<String>>>,
    transient: Mutex<HashMap<String, TransientObject>>,
}

impl fmt::Debug for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunScope")
            .field("data_tables", &self.data_table_names())
            .field("report_streams", &self.report_stream_names())
            .finish()
    }
}

impl RunScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.data_tables.lock().expect("RunScope mutex poisoned").clear();
        self.report_streams
            .lock()
            .expect("RunScope mutex poisoned")
            .clear();
        self.transient.lock().expect("RunScope mutex poisoned").clear();
    }

    /// Register (or replace) the table logged under `name`.
    pub fn log_data_table(&self, name: impl Into<String>, table: ArtifactRef) {
        self.data_tables
            .lock()
            .expect("RunScope mutex poisoned")
            .insert(name.into(), table);
    }

    pub fn data_table(&self, name: &str) -> Option<ArtifactRef> {
        self.data_tables
            .lock()
            .expect("RunScope mutex poisoned")
            .get(name)
            .cloned()
    }

    pub fn data_table_names(&self) -> Vec<String> {
        self.data_tables
            .lock()
            .expect("RunScope mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Append a line to report stream `stream`, creating it on first use.
    pub fn report(&self, stream: &str, line: impl Into<String>) {
        self.report_streams
            .lock()
            .expect("RunScope mutex poisoned")
            .entry(stream.to_string())
            .or_default()
            .push(line.into());
    }

    pub fn report_stream(&self, stream: &str) -> Option<Vec<String>> {
        self.report_streams
            .lock()
            .expect("RunScope mutex poisoned")
            .get(stream)
            .cloned()
    }

    pub fn report_stream_names(&self) -> Vec<String> {
        self.report_streams
            .lock()
            .expect("RunScope mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn store_object(&self, name: impl Into<String>, object: TransientObject) {
        self.transient
            .lock()
            .expect("RunScope mutex poisoned")
            .insert(name.into(), object);
    }

    pub fn object(&self, name: &str) -> Option<TransientObject> {
        self.transient
            .lock()
            .expect("RunScope mutex poisoned")
            .get(name)
            .cloned()
    }

    /// Typed access to a transient object.
    pub fn object_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.object(name)?.downcast::<T>().ok()
    }

    pub fn remove_object(&self, name: &str) -> Option<TransientObject> {
        self.transient
            .lock()
            .expect("RunScope mutex poisoned")
            .remove(name)
    }
}
