//! Typed error hierarchy for the report pipeline.
//!
//! Every failure a submission can hit maps to exactly one variant here.
//! Summarizer failures never appear: they are recovered locally with an
//! identity fallback (see `summarizer`), the single place in the pipeline
//! where an error is deliberately swallowed.

use thiserror::Error;

/// Errors from the bug-report pipeline and its query layer.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cannot derive owner and repository name from '{url}'")]
    MalformedRepositoryUrl { url: String },

    #[error("Access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Issue tracker error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Tracker {
        status: Option<u16>,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReportError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
