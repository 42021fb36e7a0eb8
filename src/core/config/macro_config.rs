// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable configuration of the macro engine.
//!
//! Predefined macro names, the deferred built-in list, the strict-mode
//! threshold and the date patterns are handed to [`MacroTable`] and
//! [`MacroExpander`] at construction instead of living in globals.
//!
//! [`MacroTable`]: crate::core::macros::MacroTable
//! [`MacroExpander`]: crate::core::macros::MacroExpander

use std::path::PathBuf;

use super::version::OperatorVersion;
use crate::core::util::temp_dir::canonical_temp_dir;

/// Name of the process, derived from its location.
pub const PROCESS_NAME: &str = "process_name";
/// File name of the process, derived from its location.
pub const PROCESS_FILE: &str = "process_file";
/// Full path of the process, derived from its location.
pub const PROCESS_PATH: &str = "process_path";
/// Wall-clock time the current run started.
pub const PROCESS_START: &str = "process_start";
/// Canonical temporary directory of this engine instance.
pub const TEMP_DIR: &str = "tempdir";

pub const OPERATOR_NAME: &str = "operator_name";
pub const OPERATOR_CLASS: &str = "operator_class";
pub const EXECUTION_COUNT: &str = "execution_count";
pub const EXECUTION_COUNT_NEXT: &str = "execution_count_next";

/// Short built-in forms resolved by the operator-scoped pass.
pub const SHORT_NAME: &str = "n";
pub const SHORT_CLASS: &str = "c";
pub const SHORT_COUNT: &str = "a";
pub const SHORT_COUNT_NEXT: &str = "b";
pub const SHORT_TIME: &str = "t";
pub const SHORT_PERCENT: &str = "%";
pub const SHIFTED_COUNT_PREFIX: &str = "p[";
pub const OPERATOR_VALUE_PREFIX: &str = "v[";

/// Compatibility level from which unresolved macros are an error rather than echoed.
pub const STRICT_MACRO_VERSION: OperatorVersion = OperatorVersion::new(6, 0, 3);

/// `process_start` format.
pub const START_TIME_PATTERN: &str = "%Y.%m.%d %H:%M:%S";
/// `%{t}` format; safe to embed in file names.
pub const TIME_PATTERN: &str = "%Y_%m_%d-%p_%I_%M_%S";

#[derive(Debug, Clone)]
pub struct MacroConfig {
    /// Resolvable without a current operator; shadow same-named user macros.
    pub operator_independent: Vec<String>,
    /// Resolvable only with a current operator.
    pub operator_dependent: Vec<String>,
    /// Tokens the general pass leaves in place for the operator-scoped pass.
    /// Two-character entries also match as a prefix.
    pub deferred_builtins: Vec<String>,
    pub strict_threshold: OperatorVersion,
    pub start_time_pattern: &'static str,
    pub time_pattern: &'static str,
    pub temp_dir: PathBuf,
}

impl MacroConfig {
    pub fn is_operator_independent(&self, name: &str) -> bool {
        self.operator_independent.iter().any(|n| n == name)
    }

    pub fn is_operator_dependent(&self, name: &str) -> bool {
        self.operator_dependent.iter().any(|n| n == name)
    }

    /// Whether the general pass must re-emit `token` untouched.
    pub fn is_deferred(&self, token: &str) -> bool {
        self.deferred_builtins.iter().any(|builtin| {
            token == builtin
                || (builtin.chars().count() == 2 && token.chars().take(2).eq(builtin.chars()))
        })
    }

    /// Whether expansion at `level` fails on undefined macros.
    #[inline]
    pub fn is_strict(&self, level: OperatorVersion) -> bool {
        level.is_at_least(self.strict_threshold)
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }
}

impl Default for MacroConfig {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            operator_independent: names(&[
                PROCESS_NAME,
                PROCESS_FILE,
                PROCESS_PATH,
                PROCESS_START,
                TEMP_DIR,
            ]),
            operator_dependent: names(&[
                OPERATOR_NAME,
                OPERATOR_CLASS,
                EXECUTION_COUNT,
                EXECUTION_COUNT_NEXT,
            ]),
            deferred_builtins: names(&[
                SHORT_NAME,
                SHORT_CLASS,
                SHORT_COUNT,
                SHORT_COUNT_NEXT,
                SHORT_TIME,
                SHORT_PERCENT,
                SHIFTED_COUNT_PREFIX,
                OPERATOR_VALUE_PREFIX,
                OPERATOR_NAME,
                OPERATOR_CLASS,
                EXECUTION_COUNT,
                EXECUTION_COUNT_NEXT,
            ]),
            strict_threshold: STRICT_MACRO_VERSION,
            start_time_pattern: START_TIME_PATTERN,
            time_pattern: TIME_PATTERN,
            temp_dir: canonical_temp_dir().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_exact_and_prefix() {
        let config = MacroConfig::default();
        assert!(config.is_deferred("n"));
        assert!(config.is_deferred("p[3]"));
        assert!(config.is_deferred("v[Op.value]"));
        assert!(config.is_deferred("%"));
        assert!(config.is_deferred("operator_name"));
        assert!(!config.is_deferred("name"));
        assert!(!config.is_deferred("path"));
        assert!(!config.is_deferred("process_name"));
    }

    #[test]
    fn test_strict_threshold() {
        let config = MacroConfig::default();
        assert!(!config.is_strict(OperatorVersion::new(6, 0, 2)));
        assert!(config.is_strict(OperatorVersion::new(6, 0, 3)));
        assert!(config.is_strict(OperatorVersion::CURRENT));
    }

    #[test]
    fn test_predefined_sets_are_disjoint() {
        let config = MacroConfig::default();
        for name in &config.operator_independent {
            assert!(!config.is_operator_dependent(name));
        }
    }
}
