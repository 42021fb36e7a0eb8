// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process execution engine: run/pause/resume/stop control, pooled and
//! cancellable execution of operator trees, process flow filters and
//! `%{...}` macro expansion.

pub mod core;

pub use crate::core::config::{EngineConfig, ExecutionContext, OpFlowContext, OperatorVersion};
pub use crate::core::error::{OpFlowError, OpFlowResult};
pub use crate::core::process::{ExecutionPhase, Process};
