//! Domain error types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// One offending input row found while validating raw trades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

fn join_issues(issues: &[RowIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    EmptyInput,
    Config,
    Alignment,
    InsufficientData,
    Io,
}

/// Top-level error type for qmetrics.
#[derive(Debug, thiserror::Error)]
pub enum QmetricsError {
    #[error("invalid trade records ({} rows): {}", .issues.len(), join_issues(.issues))]
    Validation { issues: Vec<RowIssue> },

    #[error("empty input: {context}")]
    EmptyInput { context: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("misaligned return series: {reason}")]
    Alignment { reason: String },

    #[error("insufficient data: {segment} segment is empty for split at {split}")]
    InsufficientData {
        segment: String,
        split: DateTime<Utc>,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QmetricsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QmetricsError::Validation { .. } => ErrorKind::Validation,
            QmetricsError::EmptyInput { .. } => ErrorKind::EmptyInput,
            QmetricsError::ConfigParse { .. }
            | QmetricsError::ConfigMissing { .. }
            | QmetricsError::ConfigInvalid { .. } => ErrorKind::Config,
            QmetricsError::Alignment { .. } => ErrorKind::Alignment,
            QmetricsError::InsufficientData { .. } => ErrorKind::InsufficientData,
            QmetricsError::Csv(_) | QmetricsError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        QmetricsError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        QmetricsError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&QmetricsError> for std::process::ExitCode {
    fn from(err: &QmetricsError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Validation | ErrorKind::EmptyInput => 3,
            ErrorKind::Alignment | ErrorKind::InsufficientData => 4,
        };
        std::process::ExitCode::from(code)
    }
}
