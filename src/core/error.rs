// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpFlow Core Error Types
//!
//! Error handling for process execution, macro expansion and artifact I/O.

use thiserror::Error;

/// Result type for OpFlow operations
pub type OpFlowResult<T> = Result<T, OpFlowError>;

/// Why a macro token could not be resolved.
///
/// Bracketed sub-forms report which form failed and why, so the message
/// shown to the user points at the exact problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroFailure {
    #[error("macro is not defined")]
    Undefined,

    #[error("shift count '{0}' is not an integer")]
    ShiftCountNotInteger(String),

    #[error("shift count form must be p[<integer>]")]
    ShiftCountMalformed,

    #[error("operator value reference '{0}' must have the form v[OperatorName.ValueName]")]
    ValueWrongArity(String),

    #[error("operator value reference names unknown operator '{0}'")]
    ValueUnknownOperator(String),

    #[error("operator '{operator}' has no value named '{value}'")]
    ValueMissing { operator: String, value: String },
}

/// Terminal outcome classes recorded by the statistics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Stopped,
    UserError,
    OperatorException,
}

/// Comprehensive OpFlow error types
#[derive(Error, Debug)]
pub enum OpFlowError {
    #[error("Undefined macro '%{{{token}}}'{}: {cause}", .parameter.as_ref().map(|p| format!(" in parameter '{p}'")).unwrap_or_default())]
    UndefinedMacro {
        parameter: Option<String>,
        token: String,
        cause: MacroFailure,
    },

    #[error("Process stopped")]
    ProcessStopped,

    #[error("User error{}: {message}", .operator.as_ref().map(|o| format!(" in operator '{o}'")).unwrap_or_default())]
    UserError {
        message: String,
        operator: Option<String>,
        slot: Option<usize>,
    },

    #[error("Operator exception{}: {message}", .operator.as_ref().map(|o| format!(" in operator '{o}'")).unwrap_or_default())]
    OperatorException {
        message: String,
        operator: Option<String>,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Invalid parameter '{parameter:?}': {message}")]
    InvalidParameter {
        message: String,
        parameter: Option<String>,
    },

    #[error("Artifact store error at '{location}': {message}")]
    Store { message: String, location: String },

    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OpFlowError {
    /// Create an undefined-macro error for a general parameter expansion
    pub fn undefined_macro(parameter: impl Into<String>, token: impl Into<String>) -> Self {
        Self::UndefinedMacro {
            parameter: Some(parameter.into()),
            token: token.into(),
            cause: MacroFailure::Undefined,
        }
    }

    /// Create an undefined-macro error for a malformed or unresolvable sub-form
    pub fn macro_failure(token: impl Into<String>, cause: MacroFailure) -> Self {
        Self::UndefinedMacro {
            parameter: None,
            token: token.into(),
            cause,
        }
    }

    /// Create a user error not tied to an operator
    pub fn user_error(message: impl Into<String>) -> Self {
        Self::UserError {
            message: message.into(),
            operator: None,
            slot: None,
        }
    }

    /// Create a user error raised by a specific operator
    pub fn user_error_in(message: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::UserError {
            message: message.into(),
            operator: Some(operator.into()),
            slot: None,
        }
    }

    /// Create a user error for an external input or output slot
    pub fn slot_error(message: impl Into<String>, slot: usize) -> Self {
        Self::UserError {
            message: message.into(),
            operator: None,
            slot: Some(slot),
        }
    }

    /// Create a generic operator exception
    pub fn operator_exception(message: impl Into<String>, operator: Option<String>) -> Self {
        Self::OperatorException {
            message: message.into(),
            operator,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(message: impl Into<String>, config_key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Create an artifact store error
    pub fn store(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            location: location.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            source: None,
        }
    }

    /// Create a runtime error wrapping its cause
    pub fn runtime_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Runtime {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Domain failures abort a flow-filter notification and propagate to the caller
    /// instead of being logged and skipped.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::UndefinedMacro { .. }
                | Self::UserError { .. }
                | Self::Store { .. }
                | Self::ProcessStopped
        )
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::ProcessStopped)
    }

    /// Statistics class of this failure when it terminates a run.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ProcessStopped => FailureKind::Stopped,
            Self::UserError { .. } | Self::UndefinedMacro { .. } | Self::Store { .. } => {
                FailureKind::UserError
            }
            _ => FailureKind::OperatorException,
        }
    }

    /// Operator that raised this failure, when known.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Self::UserError { operator, .. } | Self::OperatorException { operator, .. } => {
                operator.as_deref()
            }
            _ => None,
        }
    }
}
