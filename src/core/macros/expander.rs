// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Macro Expansion
//!
//! Parameter values are expanded in two passes:
//!
//! 1. [`MacroExpander::expand`] resolves user and operator-independent
//!    macros. Built-in operator forms (`%{n}`, `%{p[1]}`, `%{v[Op.val]}`,
//!    ...) are left in place for the second pass. An unterminated marker
//!    makes the whole value come back unmodified.
//! 2. [`MacroExpander::expand_operator_scoped`] resolves the built-in forms
//!    against the operator being executed. Here an unterminated marker is
//!    copied literally and scanning continues behind it.
//!
//! [`MacroExpander::expand_fully`] chains both passes and then unescapes.

use std::sync::{Arc, RwLock};

use crate::core::config::macro_config::{
    EXECUTION_COUNT, EXECUTION_COUNT_NEXT, OPERATOR_CLASS, OPERATOR_NAME, OPERATOR_VALUE_PREFIX,
    SHIFTED_COUNT_PREFIX, SHORT_CLASS, SHORT_COUNT, SHORT_COUNT_NEXT, SHORT_NAME, SHORT_PERCENT,
    SHORT_TIME,
};
use crate::core::config::{MacroConfig, OperatorVersion};
use crate::core::error::{MacroFailure, OpFlowError, OpFlowResult};
use crate::core::macros::formatter::TimestampFormatter;
use crate::core::macros::scanner::{unescape, MacroScanner, Segment, MARKER};
use crate::core::macros::MacroTable;
use crate::core::operator::{Operator, OperatorLookup, OperatorValue};

pub struct MacroExpander {
    table: Arc<MacroTable>,
    lookup: Arc<dyn OperatorLookup>,
    compatibility_level: RwLock<OperatorVersion>,
    time_formatter: TimestampFormatter,
}

impl std::fmt::Debug for MacroExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroExpander")
            .field("compatibility_level", &self.compatibility_level())
            .finish()
    }
}

impl MacroExpander {
    pub fn new(
        table: Arc<MacroTable>,
        lookup: Arc<dyn OperatorLookup>,
        compatibility_level: OperatorVersion,
    ) -> Self {
        let time_formatter = TimestampFormatter::new(table.config().time_pattern);
        Self {
            table,
            lookup,
            compatibility_level: RwLock::new(compatibility_level),
            time_formatter,
        }
    }

    pub fn table(&self) -> &Arc<MacroTable> {
        &self.table
    }

    fn config(&self) -> &MacroConfig {
        self.table.config()
    }

    pub fn compatibility_level(&self) -> OperatorVersion {
        *self
            .compatibility_level
            .read()
            .expect("MacroExpander RwLock poisoned")
    }

    pub fn set_compatibility_level(&self, level: OperatorVersion) {
        *self
            .compatibility_level
            .write()
            .expect("MacroExpander RwLock poisoned") = level;
    }

    /// Whether undefined macros fail expansion at the current compatibility level.
    pub fn is_strict(&self) -> bool {
        self.config().is_strict(self.compatibility_level())
    }

    /// General pass over the value of parameter `key`.
    ///
    /// Unresolved tokens are echoed back below the strict threshold and fail
    /// with an undefined-macro error naming `key` and the token at or above it.
    pub fn expand(&self, key: &str, text: &str) -> OpFlowResult<String> {
        if !text.contains(MARKER) {
            return Ok(text.to_string());
        }
        let strict = self.is_strict();
        let mut out = String::with_capacity(text.len());
        for segment in MacroScanner::new(text) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Unterminated { .. } => return Ok(text.to_string()),
                Segment::Macro { token, raw } => {
                    if self.config().is_deferred(token) {
                        out.push_str(raw);
                    } else if let Some(value) = self.table.get(token) {
                        out.push_str(&value);
                    } else if strict {
                        return Err(OpFlowError::undefined_macro(key, token));
                    } else {
                        out.push_str(raw);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Operator-scoped pass resolving the built-in forms against `operator`.
    pub fn expand_operator_scoped(&self, text: &str, operator: &dyn Operator) -> OpFlowResult<String> {
        if !text.contains(MARKER) {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        for segment in MacroScanner::new(text) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Unterminated { raw } => out.push_str(raw),
                Segment::Macro { token, raw } => match self.resolve_builtin(token, operator)? {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(raw),
                },
            }
        }
        Ok(out)
    }

    /// Both passes followed by unescaping; `operator` is the one about to run, if any.
    pub fn expand_fully(
        &self,
        key: &str,
        text: &str,
        operator: Option<&dyn Operator>,
    ) -> OpFlowResult<String> {
        let mut expanded = self.expand(key, text)?;
        if let Some(op) = operator {
            expanded = self
                .expand_operator_scoped(&expanded, op)
                .map_err(|e| with_parameter(e, key))?;
        }
        Ok(unescape(&expanded))
    }

    /// Turn escape forms into the characters they stand for.
    pub fn unescape(text: &str) -> String {
        unescape(text)
    }

    fn resolve_builtin(&self, token: &str, operator: &dyn Operator) -> OpFlowResult<Option<String>> {
        match token {
            SHORT_NAME | OPERATOR_NAME => return Ok(Some(operator.name().to_string())),
            SHORT_CLASS | OPERATOR_CLASS => return Ok(Some(operator.class_name().to_string())),
            SHORT_COUNT | EXECUTION_COUNT => return Ok(Some(operator.applied_count().to_string())),
            SHORT_COUNT_NEXT | EXECUTION_COUNT_NEXT => {
                return Ok(Some(operator.applied_count().saturating_add(1).to_string()))
            }
            _ => {}
        }
        if let Some(rest) = token.strip_prefix(SHIFTED_COUNT_PREFIX) {
            return self.shifted_count(token, rest, operator).map(Some);
        }
        if token == SHORT_TIME {
            return Ok(Some(self.time_formatter.now()));
        }
        if let Some(rest) = token.strip_prefix(OPERATOR_VALUE_PREFIX) {
            return self.operator_value(token, rest).map(Some);
        }
        if token == SHORT_PERCENT {
            return Ok(Some("%".to_string()));
        }
        Ok(None)
    }

    /// `p[k]`: applied count shifted by `k`.
    fn shifted_count(&self, token: &str, rest: &str, operator: &dyn Operator) -> OpFlowResult<String> {
        let inner = rest
            .strip_suffix(']')
            .ok_or_else(|| OpFlowError::macro_failure(token, MacroFailure::ShiftCountMalformed))?;
        let shift: i64 = inner.trim().parse().map_err(|_| {
            OpFlowError::macro_failure(token, MacroFailure::ShiftCountNotInteger(inner.to_string()))
        })?;
        let count = i64::try_from(operator.applied_count()).unwrap_or(i64::MAX);
        Ok(count.saturating_add(shift).to_string())
    }

    /// `v[Operator.value]`: a value published by another operator.
    fn operator_value(&self, token: &str, rest: &str) -> OpFlowResult<String> {
        let wrong_arity = || {
            OpFlowError::macro_failure(
                token,
                MacroFailure::ValueWrongArity(rest.trim_end_matches(']').to_string()),
            )
        };
        let inner = rest.strip_suffix(']').ok_or_else(wrong_arity)?;
        let (op_name, value_name) = match inner.split_once('.') {
            Some((op, value)) if !value.contains('.') => (op, value),
            _ => return Err(wrong_arity()),
        };
        let target = self.lookup.find_operator(op_name).ok_or_else(|| {
            OpFlowError::macro_failure(token, MacroFailure::ValueUnknownOperator(op_name.to_string()))
        })?;
        let value = target.value(value_name).ok_or_else(|| {
            OpFlowError::macro_failure(
                token,
                MacroFailure::ValueMissing {
                    operator: op_name.to_string(),
                    value: value_name.to_string(),
                },
            )
        })?;
        Ok(match value {
            OperatorValue::Nominal(text) => text,
            OperatorValue::Numeric(number) => format_numeric(op_name, value_name, number),
        })
    }
}

fn format_numeric(op_name: &str, value_name: &str, number: f64) -> String {
    if number.is_nan() {
        log::warn!(
            "Value '{}' of operator '{}' is not a number",
            value_name,
            op_name
        );
        return "NaN".to_string();
    }
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

fn with_parameter(error: OpFlowError, key: &str) -> OpFlowError {
    match error {
        OpFlowError::UndefinedMacro {
            parameter: None,
            token,
            cause,
        } => OpFlowError::UndefinedMacro {
            parameter: Some(key.to_string()),
            token,
            cause,
        },
        other => other,
    }
}
