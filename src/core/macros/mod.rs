// SPDX-License-Identifier: MIT OR Apache-2.0

//! Macro store and the `%{...}` expansion engine.

pub mod expander;
pub mod formatter;
pub mod macro_table;
pub mod scanner;

pub use expander::MacroExpander;
pub use formatter::TimestampFormatter;
pub use macro_table::{MacroChange, MacroListener, MacroTable, ProcessLocation};
pub use scanner::{unescape, MacroScanner, Segment};
