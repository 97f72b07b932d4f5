//! Violations and the validation collaborator contract
//!
//! The scheduler treats rule evaluation as a black box: anything that
//! implements [`Validator`] can be plugged in. The built-in rules live in
//! [`crate::rules`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How serious a single rule failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Suggestion,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Suggestion => "SUGGESTION",
        };
        f.write_str(label)
    }
}

/// A single rule failure in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    /// 1-based line, when the rule can point at one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Violation {
    pub fn new(rule: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Outcome of validating one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
    pub processing_time_ms: u64,
}

impl ValidationResult {
    pub fn count(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Rule {rule} failed: {message}")]
    Rule { rule: String, message: String },

    #[error("Content of {0} is not valid UTF-8")]
    Encoding(PathBuf),

    #[error("Validator error: {0}")]
    Other(String),
}

/// Rule evaluation for one file's content.
///
/// Implementations may be slow or fail; the processor runs them on the
/// blocking pool and treats any error (or panic) as a per-file failure.
pub trait Validator: Send + Sync {
    fn validate(&self, path: &Path, content: &[u8]) -> Result<Vec<Violation>, ValidationError>;
}
