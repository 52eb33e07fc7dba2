//! Validation error types.

use std::fmt;
use thiserror::Error;

/// A single offending field in a validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Path to the offending field, `$`-rooted (for example `$.user.id`).
    pub path: String,
    /// Human-readable reason the field was rejected.
    pub reason: String,
}

impl FieldIssue {
    /// Creates an issue for a specific field path.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// A decoded response body that does not match the expected schema.
///
/// Carries one entry per offending field. A validation failure never yields
/// a partial instance; the caller gets either a fully valid value or this
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", summarize(.issues))]
pub struct ValidationError {
    /// The offending fields, in discovery order.
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Creates a validation error from a list of field issues.
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Creates a validation error for a single field.
    pub fn field(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::new(path, reason)],
        }
    }

    /// Creates a validation error with no field attribution (root path).
    pub fn message(reason: impl Into<String>) -> Self {
        Self::field("$", reason)
    }
}

/// Joins field issues for the error display.
fn summarize(issues: &[FieldIssue]) -> String {
    if issues.is_empty() {
        return "no detail recorded".to_string();
    }
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
