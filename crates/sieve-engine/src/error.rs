//! Error types for sieve-engine
//!
//! Script exceptions keep their description and source location apart so
//! hosts can inspect them; `Display` renders the combined message.

use std::fmt;
use thiserror::Error;

use crate::exception::format_exception;

/// Result type alias for engine operations
pub type JsResult<T> = Result<T, JsError>;

/// Where a script exception was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Resource name passed to `eval_with_source`.
    pub resource: String,
    pub line: u32,
}

/// A script exception translated out of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    /// The exception's own string form, e.g. `"TypeError: x is not a function"`.
    pub description: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_exception(&self.description, self.location.as_ref()))
    }
}

/// Errors surfaced by the engine bridge
#[derive(Debug, Error)]
pub enum JsError {
    /// The engine context could not be created
    #[error("Context creation failed: {message}")]
    ContextCreation { message: String },

    /// Exception thrown while compiling, running or calling script
    #[error("{0}")]
    Script(ScriptException),

    /// A structural accessor was used on a value of the wrong shape
    #[error("Cannot {operation}: expected {expected}, got {actual}")]
    TypeMismatch {
        operation: &'static str,
        expected: &'static str,
        actual: String,
    },

    /// A native callback outlived the engine that created it
    #[error("owning engine no longer exists")]
    EngineGone,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JsError {
    pub fn type_mismatch(
        operation: &'static str,
        expected: &'static str,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            operation,
            expected,
            actual: actual.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for errors that came from script code.
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Script(_))
    }

    /// Source location of a script exception, when the engine reported one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Script(exception) => exception.location.as_ref(),
            _ => None,
        }
    }
}

impl From<ScriptException> for JsError {
    fn from(exception: ScriptException) -> Self {
        Self::Script(exception)
    }
}
