// SPDX-License-Identifier: MIT OR Apache-2.0

//! Licensing and blacklist constraints consulted before a run executes.

use std::sync::Arc;

use regex::Regex;

use crate::core::error::{OpFlowError, OpFlowResult};
use crate::core::operator::Operator;

pub trait LicenseCheck: Send + Sync {
    /// Human-readable license violations of `operator`; empty when it may run.
    fn violations(&self, operator: &dyn Operator) -> Vec<String>;

    fn is_blacklisted(&self, key: &str) -> bool;
}

/// Allows everything
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveLicenseCheck;

impl LicenseCheck for PermissiveLicenseCheck {
    fn violations(&self, _operator: &dyn Operator) -> Vec<String> {
        Vec::new()
    }

    fn is_blacklisted(&self, _key: &str) -> bool {
        false
    }
}

/// Blacklists operator keys matching any of a set of anchored patterns.
#[derive(Debug, Clone)]
pub struct PatternBlacklist {
    patterns: Vec<Regex>,
}

impl PatternBlacklist {
    pub fn new<I, S>(patterns: I) -> OpFlowResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{p})$")).map_err(|e| {
                    OpFlowError::configuration_with_key(
                        format!("Invalid blacklist pattern '{p}': {e}"),
                        "license.blacklist",
                    )
                })
            })
            .collect::<OpFlowResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl LicenseCheck for PatternBlacklist {
    fn violations(&self, _operator: &dyn Operator) -> Vec<String> {
        Vec::new()
    }

    fn is_blacklisted(&self, key: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(key))
    }
}

/// Check every enabled operator; the first violation or blacklisted key fails.
pub fn verify_operators(
    check: &dyn LicenseCheck,
    operators: &[Arc<dyn Operator>],
) -> OpFlowResult<()> {
    for operator in operators.iter().filter(|op| op.is_enabled()) {
        let violations = check.violations(operator.as_ref());
        if !violations.is_empty() {
            return Err(OpFlowError::user_error_in(
                format!(
                    "License violation for operator '{}': {}",
                    operator.name(),
                    violations.join("; ")
                ),
                operator.name(),
            ));
        }
        if check.is_blacklisted(operator.license_key()) {
            return Err(OpFlowError::user_error_in(
                format!(
                    "Operator '{}' ({}) is blacklisted",
                    operator.name(),
                    operator.license_key()
                ),
                operator.name(),
            ));
        }
    }
    Ok(())
}
