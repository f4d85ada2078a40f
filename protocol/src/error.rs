use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Boundary classification for a failed request.
///
/// The three variants are structurally distinct so callers can branch on the
/// `kind` tag without string-matching messages: a validation failure is
/// retryable only after fixing the request, a not-found is retryable with a
/// different id, and an internal fault carries a [`FaultKind`] that tells the
/// caller whether waiting, retrying, or resetting is appropriate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// A required field was missing or blank.
    InvalidParams { field: String, message: String },
    /// The request referenced an id this process does not know.
    NotFound { id: String, message: String },
    /// The request was well-formed but the operation failed inside the core.
    Internal { fault: FaultKind, message: String },
}

impl RequestError {
    pub fn invalid_params(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn internal(fault: FaultKind, message: impl Into<String>) -> Self {
        Self::Internal {
            fault,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidParams { message, .. }
            | Self::NotFound { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParams { field, message } => {
                write!(f, "invalid params ({field}): {message}")
            }
            Self::NotFound { id, message } => write!(f, "not found ({id}): {message}"),
            Self::Internal { fault, message } => write!(f, "{fault}: {message}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Fault tag carried by [`RequestError::Internal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    NoProjectOpen,
    LockAcquisitionTimeout,
    UpstreamActivityTimeout,
    /// The caller-visible wait elapsed; host-side work may still be running.
    OperationTimeout,
    NoActiveDebugSession,
    SessionNotSuspended,
    EvaluatorUnavailable,
    ExtractionFailed,
    NoMatchingTests,
    SpawnFailed,
    ContextUnavailable,
    Internal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoProjectOpen => "no_project_open",
            Self::LockAcquisitionTimeout => "lock_acquisition_timeout",
            Self::UpstreamActivityTimeout => "upstream_activity_timeout",
            Self::OperationTimeout => "operation_timeout",
            Self::NoActiveDebugSession => "no_active_debug_session",
            Self::SessionNotSuspended => "session_not_suspended",
            Self::EvaluatorUnavailable => "evaluator_unavailable",
            Self::ExtractionFailed => "extraction_failed",
            Self::NoMatchingTests => "no_matching_tests",
            Self::SpawnFailed => "spawn_failed",
            Self::ContextUnavailable => "context_unavailable",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}
