// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process flow filters: observers called immediately before and after every
//! operator the tree walker runs.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::core::error::OpFlowResult;
use crate::core::operator::{ArtifactRef, Operator};

pub trait ProcessFlowFilter: Send + Sync {
    /// `next` is about to run with `inputs`; `previous` ran before it, if any.
    fn pre_operator(
        &self,
        previous: Option<&dyn Operator>,
        next: &dyn Operator,
        inputs: &[ArtifactRef],
    ) -> OpFlowResult<()>;

    /// `previous` finished with `outputs`; `next` runs after it, if any.
    fn post_operator(
        &self,
        previous: &dyn Operator,
        next: Option<&dyn Operator>,
        outputs: &[ArtifactRef],
    ) -> OpFlowResult<()>;
}

/// Ordered, idempotent filter registry.
///
/// Both notifications visit filters in registration order. A domain error
/// (see [`OpFlowError::is_domain`]) from a filter aborts the notification and
/// is returned; any other error, or a panic, is logged and the remaining
/// filters still run.
///
/// [`OpFlowError::is_domain`]: crate::core::error::OpFlowError::is_domain
#[derive(Default)]
pub struct FlowFilterChain {
    filters: RwLock<Vec<Arc<dyn ProcessFlowFilter>>>,
}

impl fmt::Debug for FlowFilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowFilterChain")
            .field("filters", &self.len())
            .finish()
    }
}

impl FlowFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filter`; adding a handle that is already present does nothing.
    pub fn add(&self, filter: Arc<dyn ProcessFlowFilter>) {
        let mut filters = self.filters.write().expect("FlowFilterChain RwLock poisoned");
        if !filters.iter().any(|f| Arc::ptr_eq(f, &filter)) {
            filters.push(filter);
        }
    }

    /// Remove exactly this handle. Returns whether it was registered.
    pub fn remove(&self, filter: &Arc<dyn ProcessFlowFilter>) -> bool {
        let mut filters = self.filters.write().expect("FlowFilterChain RwLock poisoned");
        let before = filters.len();
        filters.retain(|f| !Arc::ptr_eq(f, filter));
        filters.len() != before
    }

    pub fn len(&self) -> usize {
        self.filters.read().expect("FlowFilterChain RwLock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register every filter of this chain on `other`.
    pub fn copy_to(&self, other: &FlowFilterChain) {
        for filter in self.snapshot() {
            other.add(filter);
        }
    }

    pub fn before(
        &self,
        previous: Option<&dyn Operator>,
        next: &dyn Operator,
        inputs: Option<&[ArtifactRef]>,
    ) -> OpFlowResult<()> {
        let inputs = inputs.unwrap_or(&[]);
        self.notify("pre", next, |filter| {
            filter.pre_operator(previous, next, inputs)
        })
    }

    pub fn after(
        &self,
        previous: &dyn Operator,
        next: Option<&dyn Operator>,
        outputs: Option<&[ArtifactRef]>,
    ) -> OpFlowResult<()> {
        let outputs = outputs.unwrap_or(&[]);
        self.notify("post", previous, |filter| {
            filter.post_operator(previous, next, outputs)
        })
    }

    fn snapshot(&self) -> Vec<Arc<dyn ProcessFlowFilter>> {
        self.filters
            .read()
            .expect("FlowFilterChain RwLock poisoned")
            .clone()
    }

    fn notify<F>(&self, phase: &str, subject: &dyn Operator, call: F) -> OpFlowResult<()>
    where
        F: Fn(&dyn ProcessFlowFilter) -> OpFlowResult<()>,
    {
        for filter in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| call(filter.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_domain() => return Err(e),
                Ok(Err(e)) => log::warn!(
                    "Process flow filter failed in {}-operator notification for '{}': {}",
                    phase,
                    subject.name(),
                    e
                ),
                Err(payload) => log::warn!(
                    "Process flow filter panicked in {}-operator notification for '{}': {}",
                    phase,
                    subject.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::OpFlowError;
    use std::sync::Mutex;

    struct Op(&'static str);

    impl Operator for Op {
        fn name(&self) -> &str {
            self.0
        }
        fn class_name(&self) -> &str {
            "test"
        }
        fn applied_count(&self) -> u64 {
            0
        }
    }

    enum Behavior {
        Record,
        Fail,
        Reject,
        Panic,
    }

    struct Filter {
        id: usize,
        behavior: Behavior,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Filter {
        fn arc(id: usize, behavior: Behavior, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn ProcessFlowFilter> {
            Arc::new(Self {
                id,
                behavior,
                log: log.clone(),
            })
        }

        fn act(&self, phase: &str, count: usize) -> OpFlowResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{phase}{}:{count}", self.id));
            match self.behavior {
                Behavior::Record => Ok(()),
                Behavior::Fail => Err(OpFlowError::runtime("instrumentation broke")),
                Behavior::Reject => Err(OpFlowError::user_error("rejected")),
                Behavior::Panic => panic!("filter panicked"),
            }
        }
    }

    impl ProcessFlowFilter for Filter {
        fn pre_operator(
            &self,
            _previous: Option<&dyn Operator>,
            _next: &dyn Operator,
            inputs: &[ArtifactRef],
        ) -> OpFlowResult<()> {
            self.act("pre", inputs.len())
        }

        fn post_operator(
            &self,
            _previous: &dyn Operator,
            _next: Option<&dyn Operator>,
            outputs: &[ArtifactRef],
        ) -> OpFlowResult<()> {
            self.act("post", outputs.len())
        }
    }

    #[test]
    fn test_add_is_idempotent_and_remove_exact() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FlowFilterChain::new();
        let a = Filter::arc(1, Behavior::Record, &log);
        let b = Filter::arc(2, Behavior::Record, &log);
        chain.add(a.clone());
        chain.add(a.clone());
        chain.add(b.clone());
        assert_eq!(chain.len(), 2);
        assert!(chain.remove(&a));
        assert!(!chain.remove(&a));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_order_is_registration_order_both_ways() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FlowFilterChain::new();
        chain.add(Filter::arc(1, Behavior::Record, &log));
        chain.add(Filter::arc(2, Behavior::Record, &log));

        chain.before(None, &Op("A"), None).unwrap();
        chain.after(&Op("A"), Some(&Op("B")), None).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre1:0", "pre2:0", "post1:0", "post2:0"]
        );
    }

    #[test]
    fn test_non_domain_failures_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FlowFilterChain::new();
        chain.add(Filter::arc(1, Behavior::Fail, &log));
        chain.add(Filter::arc(2, Behavior::Panic, &log));
        chain.add(Filter::arc(3, Behavior::Record, &log));

        assert!(chain.before(None, &Op("A"), None).is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["pre1:0", "pre2:0", "pre3:0"]);
    }

    #[test]
    fn test_domain_failure_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FlowFilterChain::new();
        chain.add(Filter::arc(1, Behavior::Reject, &log));
        chain.add(Filter::arc(2, Behavior::Record, &log));

        let err = chain.after(&Op("A"), None, None).unwrap_err();
        assert!(matches!(err, OpFlowError::UserError { ref message, .. } if message == "rejected"));
        assert_eq!(*log.lock().unwrap(), vec!["post1:0"]);
    }

    #[test]
    fn test_copy_to() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let parent = FlowFilterChain::new();
        let shared = Filter::arc(1, Behavior::Record, &log);
        parent.add(shared.clone());
        let child = FlowFilterChain::new();
        child.add(shared);
        child.add(Filter::arc(2, Behavior::Record, &log));
        parent.copy_to(&child);
        assert_eq!(child.len(), 2);
    }
}
