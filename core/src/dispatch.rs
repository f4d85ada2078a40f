//! The application context and the completion bridge.
//!
//! Every state-mutating interaction with the host environment runs on a
//! single logical context: callers never touch host state from their own
//! thread, they dispatch a job and block on its completion with a hard
//! timeout.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::BridgeError;
use crate::error::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct ContextInner {
    jobs: StdMutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to the single application context.
///
/// Jobs dispatched here run strictly one at a time, in order, on a dedicated
/// worker. Cloning the handle shares the same context.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<ContextInner>,
}

impl AppContext {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self {
            inner: Arc::new(ContextInner {
                jobs: StdMutex::new(Some(tx)),
                worker: StdMutex::new(Some(worker)),
            }),
        }
    }

    /// Schedules `job` onto the context. Fails only after [`shutdown`].
    ///
    /// [`shutdown`]: AppContext::shutdown
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let sender = {
            let guard = lock_or_recover(&self.inner.jobs);
            guard.clone()
        };
        let Some(sender) = sender else {
            return Err(BridgeError::ContextUnavailable);
        };
        sender
            .send(Box::new(job))
            .map_err(|_| BridgeError::ContextUnavailable)
    }

    /// Closes the job queue and waits for already-dispatched work to finish.
    pub async fn shutdown(&self) {
        let closed = lock_or_recover(&self.inner.jobs).take();
        drop(closed);
        let worker = lock_or_recover(&self.inner.worker).take();
        if let Some(worker) = worker
            && worker.await.is_err()
        {
            tracing::warn!("application context worker aborted with a panic");
        }
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot resolution handle passed to dispatched host work.
///
/// Exactly one resolution counts; later calls are ignored and report `false`.
/// The handle is cheap to clone so host code can thread it through callbacks.
pub struct Completion<T> {
    tx: Arc<StdMutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(StdMutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Resolves the completion. Returns `false` if it was already resolved
    /// or the waiter has gone away (e.g. its timeout elapsed).
    pub fn resolve(&self, value: T) -> bool {
        let sender = lock_or_recover(&self.tx).take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => {
                tracing::debug!("completion already resolved; ignoring duplicate resolution");
                false
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        lock_or_recover(&self.tx).is_none()
    }
}

/// Dispatches `start` onto the context and blocks the caller until the
/// completion it hands out resolves, bounded by `wait`.
///
/// On timeout the caller gets [`BridgeError::OperationTimeout`] immediately;
/// the dispatched work may still be running. That hazard is part of the
/// contract: the bridge never cancels host-side work it does not own.
pub async fn await_completion<T, F>(
    ctx: &AppContext,
    what: &str,
    wait: Duration,
    start: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>) + Send + 'static,
{
    let (completion, rx) = Completion::channel();
    ctx.dispatch(move || start(completion))?;

    let waited_ms = wait.as_millis() as u64;
    match tokio::time::timeout(wait, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(BridgeError::internal(format!(
            "{what} dropped its completion without resolving"
        ))),
        Err(_) => {
            tracing::warn!(what, waited_ms, "operation timed out; host-side work may continue");
            Err(BridgeError::OperationTimeout {
                what: what.to_string(),
                waited_ms,
            })
        }
    }
}

pub(crate) fn lock_or_recover<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn jobs_run_in_dispatch_order() {
        let ctx = AppContext::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..8 {
            let seen = Arc::clone(&seen);
            ctx.dispatch(move || lock_or_recover(&seen).push(i))
                .expect("dispatch");
        }
        ctx.shutdown().await;
        assert_eq!(*lock_or_recover(&seen), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_a_typed_error() {
        let ctx = AppContext::new();
        ctx.shutdown().await;
        assert_matches!(
            ctx.dispatch(|| {}),
            Err(BridgeError::ContextUnavailable)
        );
    }

    #[tokio::test]
    async fn completion_resolves_exactly_once() {
        let ctx = AppContext::new();
        let extra = Arc::new(AtomicUsize::new(0));
        let extra_in_job = Arc::clone(&extra);
        let value = await_completion(&ctx, "double resolve", Duration::from_secs(1), move |done| {
            assert!(done.resolve(41));
            if !done.resolve(42) {
                extra_in_job.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await
        .expect("first resolution wins");
        assert_eq!(value, 41);
        ctx.shutdown().await;
        assert_eq!(extra.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_returns_promptly_and_typed() {
        let ctx = AppContext::new();
        let started = tokio::time::Instant::now();
        let result: Result<()> =
            await_completion(&ctx, "stuck work", Duration::from_millis(100), |done| {
                // never resolve; the handle outlives the wait
                std::mem::forget(done);
            })
            .await;
        assert_matches!(
            result,
            Err(BridgeError::OperationTimeout { waited_ms: 100, .. })
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn dropped_completion_is_an_internal_fault_not_a_hang() {
        let ctx = AppContext::new();
        let result: Result<()> =
            await_completion(&ctx, "forgetful work", Duration::from_secs(5), |done| {
                drop(done);
            })
            .await;
        assert_matches!(result, Err(BridgeError::Internal { .. }));
        ctx.shutdown().await;
    }
}
