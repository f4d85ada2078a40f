use thiserror::Error;

use hostbridge_protocol::FaultKind;
use hostbridge_protocol::RequestError;

use crate::op_lock::OpClass;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Every failure the core can produce, as data.
///
/// Nothing in this crate panics across the public boundary; callers receive
/// one of these variants and can decide whether to retry, wait longer, or
/// reset the affected gate.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no project is open in the host environment")]
    NoProjectOpen,

    #[error("could not acquire the {class} lock within {waited_ms}ms")]
    LockAcquisitionTimeout { class: OpClass, waited_ms: u64 },

    #[error("{class} activity triggered outside this bridge did not finish within {waited_ms}ms")]
    UpstreamActivityTimeout { class: OpClass, waited_ms: u64 },

    /// The caller-visible wait elapsed. The dispatched host-side work may
    /// still be running; the bridge never cancels work it does not own.
    #[error("{what} did not complete within {waited_ms}ms (host-side work may still be running)")]
    OperationTimeout { what: String, waited_ms: u64 },

    #[error("unknown run id {run_id}")]
    RunNotFound { run_id: String },

    #[error("no active debug session")]
    NoActiveDebugSession,

    #[error("the debug session is not suspended")]
    SessionNotSuspended,

    #[error("the expression evaluator is unavailable in this session")]
    EvaluatorUnavailable,

    #[error("failed to extract test results: {reason}")]
    ExtractionFailed { reason: String },

    #[error("no tests matched the requested pattern")]
    NoMatchingTests,

    #[error("failed to start process for {config_name}")]
    SpawnFailed {
        config_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("the application context is shut down")]
    ContextUnavailable,

    #[error("internal failure: {message}")]
    Internal { message: String },
}

impl BridgeError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Self::NoProjectOpen => FaultKind::NoProjectOpen,
            Self::LockAcquisitionTimeout { .. } => FaultKind::LockAcquisitionTimeout,
            Self::UpstreamActivityTimeout { .. } => FaultKind::UpstreamActivityTimeout,
            Self::OperationTimeout { .. } => FaultKind::OperationTimeout,
            Self::NoActiveDebugSession => FaultKind::NoActiveDebugSession,
            Self::SessionNotSuspended => FaultKind::SessionNotSuspended,
            Self::EvaluatorUnavailable => FaultKind::EvaluatorUnavailable,
            Self::ExtractionFailed { .. } => FaultKind::ExtractionFailed,
            Self::NoMatchingTests => FaultKind::NoMatchingTests,
            Self::SpawnFailed { .. } => FaultKind::SpawnFailed,
            Self::ContextUnavailable => FaultKind::ContextUnavailable,
            Self::RunNotFound { .. } | Self::Internal { .. } => FaultKind::Internal,
        }
    }

    /// Boundary classification: unknown ids become `not_found`, everything
    /// else an `internal` fault tagged with its kind.
    pub fn into_request_error(self) -> RequestError {
        match self {
            Self::RunNotFound { run_id } => {
                RequestError::not_found(run_id, "no run with this id is registered")
            }
            other => {
                let fault = other.fault_kind();
                let message = match &other {
                    BridgeError::SpawnFailed { source, .. } => format!("{other}: {source}"),
                    _ => other.to_string(),
                };
                RequestError::internal(fault, message)
            }
        }
    }
}
