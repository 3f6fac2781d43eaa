//! Structured error types shared across study crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`StudyError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (variant ids, paths, targets).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for study orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum StudyError {
    /// Invalid option combinations or malformed variation specifications.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Structural problems in a model description.
    #[error("model error: {0}")]
    Model(ErrorInfo),
    /// A modification referenced a missing target or carried the wrong value kind.
    #[error("modification error: {0}")]
    Modification(ErrorInfo),
    /// Solver artifact generation or loading failed.
    #[error("artifact error: {0}")]
    Artifact(ErrorInfo),
    /// The numerical run or an experiment delegate failed.
    #[error("execution error: {0}")]
    Execution(ErrorInfo),
    /// Filesystem and persistence failures.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
    /// Batch submission failures.
    #[error("submission error: {0}")]
    Submission(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl StudyError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            StudyError::Config(info)
            | StudyError::Model(info)
            | StudyError::Modification(info)
            | StudyError::Artifact(info)
            | StudyError::Execution(info)
            | StudyError::Storage(info)
            | StudyError::Submission(info)
            | StudyError::Serde(info) => info,
        }
    }

    /// Returns true for errors that must abort before any variant runs.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, StudyError::Config(_) | StudyError::Model(_))
    }

    /// Shorthand for a storage error carrying the offending path.
    pub fn storage(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        StudyError::Storage(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
