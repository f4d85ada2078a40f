//! Synchronous facade over the host's debugger.
//!
//! Every call validates preconditions before anything is dispatched: an
//! invalid call costs nothing on the application context. Valid calls go
//! through the completion bridge with the short debug timeout; these are
//! seconds-scale operations, not minutes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use hostbridge_protocol::StackFrame;
use hostbridge_protocol::Variable;

use crate::dispatch::AppContext;
use crate::dispatch::Completion;
use crate::dispatch::await_completion;
use crate::error::BridgeError;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSessionState {
    /// No session exists.
    None,
    /// A session exists but is executing.
    Running,
    /// A session exists and is stopped at a breakpoint or pause.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Over,
    Into,
    Out,
}

impl StepKind {
    fn label(self) -> &'static str {
        match self {
            StepKind::Over => "step over",
            StepKind::Into => "step into",
            StepKind::Out => "step out",
        }
    }
}

/// What the host's evaluator produced for an expression.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    Value {
        value: String,
        type_name: Option<String>,
    },
    /// The session has no evaluator (e.g. attached without sources).
    Unavailable,
    Failed {
        message: String,
    },
}

/// Successful evaluation result handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: String,
    pub type_name: Option<String>,
}

/// One part of a multi-part children enumeration.
#[derive(Debug)]
pub enum ChildrenPart<T> {
    Items { items: Vec<T>, last: bool },
    Error { message: String },
}

/// Handed to the host for stack/variable enumeration; the host pushes parts
/// and marks the final one with `last = true`, or signals an error.
pub struct ChildrenSink<T> {
    tx: mpsc::UnboundedSender<ChildrenPart<T>>,
}

impl<T> Clone for ChildrenSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> ChildrenSink<T> {
    /// Returns `false` once the waiter has gone away (timeout elapsed).
    pub fn push(&self, items: Vec<T>, last: bool) -> bool {
        self.tx.send(ChildrenPart::Items { items, last }).is_ok()
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx
            .send(ChildrenPart::Error {
                message: message.into(),
            })
            .is_ok()
    }
}

/// The host's debugger, as seen from the bridge. All methods are invoked on
/// the application context.
pub trait DebugHost: Send + Sync + 'static {
    /// Cheap state probe; called before dispatch to validate preconditions.
    fn session_state(&self) -> DebugSessionState;

    fn pause(&self, done: Completion<std::result::Result<(), String>>);
    fn resume(&self, done: Completion<std::result::Result<(), String>>);
    fn step(&self, kind: StepKind, done: Completion<std::result::Result<(), String>>);
    fn evaluate(&self, expression: String, done: Completion<EvalOutcome>);
    fn stack(&self, sink: ChildrenSink<StackFrame>);
    fn variables(&self, frame_index: u32, sink: ChildrenSink<Variable>);
}

pub struct DebugFacade {
    ctx: AppContext,
    host: Arc<dyn DebugHost>,
    call_timeout: Duration,
}

impl DebugFacade {
    pub fn new(ctx: AppContext, host: Arc<dyn DebugHost>, call_timeout: Duration) -> Self {
        Self {
            ctx,
            host,
            call_timeout,
        }
    }

    fn require_session(&self) -> Result<DebugSessionState> {
        match self.host.session_state() {
            DebugSessionState::None => {
                debug!("debug call rejected: no active session");
                Err(BridgeError::NoActiveDebugSession)
            }
            state => Ok(state),
        }
    }

    fn require_suspended(&self) -> Result<()> {
        match self.require_session()? {
            DebugSessionState::Suspended => Ok(()),
            DebugSessionState::Running => {
                debug!("debug call rejected: session not suspended");
                Err(BridgeError::SessionNotSuspended)
            }
            DebugSessionState::None => Err(BridgeError::NoActiveDebugSession),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        self.require_session()?;
        let host = Arc::clone(&self.host);
        let outcome = await_completion(&self.ctx, "debugger pause", self.call_timeout, move |done| {
            host.pause(done)
        })
        .await?;
        outcome.map_err(BridgeError::internal)
    }

    pub async fn resume(&self) -> Result<()> {
        self.require_session()?;
        let host = Arc::clone(&self.host);
        let outcome =
            await_completion(&self.ctx, "debugger resume", self.call_timeout, move |done| {
                host.resume(done)
            })
            .await?;
        outcome.map_err(BridgeError::internal)
    }

    pub async fn step(&self, kind: StepKind) -> Result<()> {
        self.require_suspended()?;
        let host = Arc::clone(&self.host);
        let outcome = await_completion(&self.ctx, kind.label(), self.call_timeout, move |done| {
            host.step(kind, done)
        })
        .await?;
        outcome.map_err(BridgeError::internal)
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Evaluation> {
        self.require_suspended()?;
        let host = Arc::clone(&self.host);
        let expression = expression.to_string();
        let outcome = await_completion(
            &self.ctx,
            "expression evaluation",
            self.call_timeout,
            move |done| host.evaluate(expression, done),
        )
        .await?;
        match outcome {
            EvalOutcome::Value { value, type_name } => Ok(Evaluation { value, type_name }),
            EvalOutcome::Unavailable => Err(BridgeError::EvaluatorUnavailable),
            EvalOutcome::Failed { message } => {
                Err(BridgeError::internal(format!("evaluation failed: {message}")))
            }
        }
    }

    pub async fn stack(&self) -> Result<Vec<StackFrame>> {
        self.require_suspended()?;
        let host = Arc::clone(&self.host);
        self.collect_children("stack enumeration", move |sink| host.stack(sink))
            .await
    }

    pub async fn variables(&self, frame_index: u32) -> Result<Vec<Variable>> {
        self.require_suspended()?;
        let host = Arc::clone(&self.host);
        self.collect_children("variable enumeration", move |sink| {
            host.variables(frame_index, sink)
        })
        .await
    }

    /// Drains the children channel until a part with `last = true` or an
    /// error signal, all within the single debug call timeout.
    async fn collect_children<T: Send + 'static>(
        &self,
        what: &str,
        start: impl FnOnce(ChildrenSink<T>) + Send + 'static,
    ) -> Result<Vec<T>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ctx.dispatch(move || start(ChildrenSink { tx }))?;

        let deadline = Instant::now() + self.call_timeout;
        let waited_ms = self.call_timeout.as_millis() as u64;
        let mut collected = Vec::new();
        loop {
            let part = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(part)) => part,
                Ok(None) => {
                    return Err(BridgeError::internal(format!(
                        "{what} dropped its sink before the last part"
                    )));
                }
                Err(_) => {
                    return Err(BridgeError::OperationTimeout {
                        what: what.to_string(),
                        waited_ms,
                    });
                }
            };
            match part {
                ChildrenPart::Items { items, last } => {
                    collected.extend(items);
                    if last {
                        return Ok(collected);
                    }
                }
                ChildrenPart::Error { message } => {
                    return Err(BridgeError::internal(message));
                }
            }
        }
    }
}
