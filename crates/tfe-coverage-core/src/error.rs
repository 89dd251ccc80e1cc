//! Coverage engine error types

use crate::model::Source;
use std::path::PathBuf;
use thiserror::Error;

/// Coverage engine errors
#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Invalid {origin} record{} ({reason}): {record}", scope_suffix(.scope))]
    Normalization {
        origin: Source,
        /// Scope whose export held the record, once known
        scope: Option<String>,
        reason: String,
        /// Offending raw record, rendered as JSON
        record: String,
    },

    #[error("Failed to fetch {origin} inventory for scope '{scope}': {source}")]
    Fetch {
        origin: Source,
        scope: String,
        #[source]
        source: FetchError,
    },

    #[error(
        "Duplicate matching key '{key}' in {origin} inventory: '{first_id}' and '{second_id}' collide"
    )]
    DuplicateKey {
        origin: Source,
        key: String,
        first_id: String,
        second_id: String,
    },

    #[error("Cache file {path} is unreadable, starting with an empty cache: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("Run cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("Invalid resource type list: {0}")]
    InvalidResourceTypes(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Whether this error is always absorbed by the engine rather than ending a run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoverageError::CacheCorruption { .. })
    }

    /// Attach the scope a normalization error came from
    pub(crate) fn in_scope(self, scope: &str) -> Self {
        match self {
            CoverageError::Normalization {
                origin,
                scope: None,
                reason,
                record,
            } => CoverageError::Normalization {
                origin,
                scope: Some(scope.to_string()),
                reason,
                record,
            },
            other => other,
        }
    }
}

fn scope_suffix(scope: &Option<String>) -> String {
    scope
        .as_ref()
        .map(|s| format!(" in scope '{}'", s))
        .unwrap_or_default()
}

/// Failure reported by an upstream inventory fetch.
///
/// Fetchers are black boxes to the engine: a fetch either yields a raw
/// inventory or one of these, exactly once per call.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct FetchError {
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
