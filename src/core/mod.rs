// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod config;
pub mod error;
pub mod flow;
pub mod license;
pub mod macros;
pub mod operator;
pub mod process;
pub mod state;
pub mod statistics;
pub mod store;
pub mod util;
