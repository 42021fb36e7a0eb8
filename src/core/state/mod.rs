// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Run State
//!
//! [`RunState`] is the STOPPED / PAUSED / RUNNING machine shared between the
//! thread driving a process and any controller thread calling
//! [`RunState::resume`] or [`RunState::stop`].
//!
//! ```text
//!            start                 pause
//!  STOPPED ─────────▶ RUNNING ◀──────────▶ PAUSED
//!     ▲                  │      resume        │
//!     └──── stop ────────┴──────── stop ──────┘
//! ```
//!
//! [`RunState::pause`] is the one blocking wait of the engine. It parks the
//! caller on a condition variable guarded by the state lock until the state
//! leaves PAUSED. Listeners are called outside the lock, once per distinct
//! transition.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};

use crate::core::operator::{ArtifactRef, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Stopped,
    Paused,
    Running,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "STOPPED",
            Self::Paused => "PAUSED",
            Self::Running => "RUNNING",
        };
        f.write_str(name)
    }
}

/// Classified state change delivered to [`ProcessStateListener`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTransition {
    /// STOPPED -> RUNNING
    Started,
    /// PAUSED -> RUNNING
    Resumed,
    Paused,
    Stopped,
}

impl StateTransition {
    fn classify(from: ProcessState, to: ProcessState) -> Option<Self> {
        match (from, to) {
            (a, b) if a == b => None,
            (ProcessState::Stopped, ProcessState::Running) => Some(Self::Started),
            (ProcessState::Paused, ProcessState::Running) => Some(Self::Resumed),
            (ProcessState::Running, ProcessState::Paused) => Some(Self::Paused),
            (_, ProcessState::Stopped) => Some(Self::Stopped),
            _ => None,
        }
    }
}

pub trait ProcessStateListener: Send + Sync {
    fn state_changed(&self, transition: StateTransition);
}

impl<F> ProcessStateListener for F
where
    F: Fn(StateTransition) + Send + Sync,
{
    fn state_changed(&self, transition: StateTransition) {
        self(transition)
    }
}

/// Whether a breakpoint sits before or after its operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointLocation {
    Before,
    After,
}

pub trait BreakpointListener: Send + Sync {
    /// The run parked at a breakpoint. `artifacts` are the operator's inputs
    /// for [`BreakpointLocation::Before`] and its outputs for `After`.
    fn breakpoint_reached(
        &self,
        operator: &dyn Operator,
        artifacts: &[ArtifactRef],
        location: BreakpointLocation,
    );

    /// The run left the breakpoint via `resume`.
    fn resumed(&self);
}

pub struct RunState {
    state: Mutex<ProcessState>,
    wake: Condvar,
    state_listeners: RwLock<Vec<Arc<dyn ProcessStateListener>>>,
    breakpoint_listeners: RwLock<Vec<Arc<dyn BreakpointListener>>>,
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::Stopped),
            wake: Condvar::new(),
            state_listeners: RwLock::new(Vec::new()),
            breakpoint_listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.lock()
    }

    /// STOPPED or PAUSED -> RUNNING. No-op when already running.
    pub fn start(&self) {
        if let Some(transition) = self.transition(ProcessState::Running) {
            self.fire_state(transition);
            if transition == StateTransition::Resumed {
                self.fire_resumed();
            }
        }
    }

    /// Park the calling thread at a breakpoint until `resume` or `stop`.
    ///
    /// Entering PAUSED notifies state and breakpoint listeners before the
    /// wait starts. Pausing an already paused run waits without a second
    /// notification; pausing a stopped run returns at once. Returns the state
    /// the run left the pause with.
    pub fn pause(
        &self,
        operator: &dyn Operator,
        artifacts: &[ArtifactRef],
        location: BreakpointLocation,
    ) -> ProcessState {
        let entered = {
            let mut state = self.lock();
            match *state {
                ProcessState::Stopped => return ProcessState::Stopped,
                ProcessState::Paused => false,
                ProcessState::Running => {
                    *state = ProcessState::Paused;
                    self.wake.notify_all();
                    true
                }
            }
        };
        if entered {
            self.fire_state(StateTransition::Paused);
            for listener in self.breakpoint_snapshot() {
                listener.breakpoint_reached(operator, artifacts, location);
            }
        }

        let mut state = self.lock();
        while *state == ProcessState::Paused {
            state = self.wake.wait(state).expect("RunState mutex poisoned");
        }
        *state
    }

    /// PAUSED -> RUNNING, waking the parked thread. No-op in any other state.
    pub fn resume(&self) {
        let resumed = {
            let mut state = self.lock();
            if *state == ProcessState::Paused {
                *state = ProcessState::Running;
                self.wake.notify_all();
                true
            } else {
                false
            }
        };
        if resumed {
            self.fire_state(StateTransition::Resumed);
            self.fire_resumed();
        }
    }

    /// Any state -> STOPPED, waking a parked thread.
    pub fn stop(&self) {
        if let Some(transition) = self.transition(ProcessState::Stopped) {
            self.fire_state(transition);
        }
    }

    pub fn should_stop(&self) -> bool {
        self.state() == ProcessState::Stopped
    }

    pub fn should_pause(&self) -> bool {
        self.state() == ProcessState::Paused
    }

    pub fn add_state_listener(&self, listener: Arc<dyn ProcessStateListener>) {
        let mut listeners = self
            .state_listeners
            .write()
            .expect("RunState RwLock poisoned");
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_state_listener(&self, listener: &Arc<dyn ProcessStateListener>) {
        self.state_listeners
            .write()
            .expect("RunState RwLock poisoned")
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn add_breakpoint_listener(&self, listener: Arc<dyn BreakpointListener>) {
        let mut listeners = self
            .breakpoint_listeners
            .write()
            .expect("RunState RwLock poisoned");
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_breakpoint_listener(&self, listener: &Arc<dyn BreakpointListener>) {
        self.breakpoint_listeners
            .write()
            .expect("RunState RwLock poisoned")
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn lock(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().expect("RunState mutex poisoned")
    }

    /// Move to `to` under the lock and wake waiters. `None` when nothing changed.
    fn transition(&self, to: ProcessState) -> Option<StateTransition> {
        let mut state = self.lock();
        let transition = StateTransition::classify(*state, to)?;
        *state = to;
        self.wake.notify_all();
        Some(transition)
    }

    fn fire_state(&self, transition: StateTransition) {
        let listeners = self
            .state_listeners
            .read()
            .expect("RunState RwLock poisoned")
            .clone();
        for listener in listeners {
            listener.state_changed(transition);
        }
    }

    fn fire_resumed(&self) {
        for listener in self.breakpoint_snapshot() {
            listener.resumed();
        }
    }

    fn breakpoint_snapshot(&self) -> Vec<Arc<dyn BreakpointListener>> {
        self.breakpoint_listeners
            .read()
            .expect("RunState RwLock poisoned")
            .clone()
    }
}
