//! Per-class mutual exclusion for host operations.
//!
//! Exactly one build and one test may be in flight per process. Acquisition
//! is bounded, release happens on every path through permit drop, and a
//! non-forcing `reset` probe exists as the recovery escape hatch.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Duration;
use tokio::time::Instant;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::error::BridgeError;
use crate::error::Result;

/// Named category of mutually-exclusive work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Build,
    Test,
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpClass::Build => write!(f, "build"),
            OpClass::Test => write!(f, "test"),
        }
    }
}

/// Liveness probe for same-class activity this bridge did not start,
/// e.g. a build triggered from the host's own UI.
pub trait ActivityProbe: Send + Sync {
    fn in_progress(&self) -> bool;
}

impl<F> ActivityProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn in_progress(&self) -> bool {
        self()
    }
}

/// Mutual-exclusion gate for one operation class.
#[derive(Clone)]
pub struct OperationGate {
    class: OpClass,
    permits: Arc<Semaphore>,
}

/// Holding this is holding the gate. Dropping it releases on every path:
/// success, failure, or timeout.
#[derive(Debug)]
pub struct OperationPermit {
    class: OpClass,
    _permit: OwnedSemaphorePermit,
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        debug!(class = %self.class, "operation gate released");
    }
}

/// Result of a [`OperationGate::reset`] probe. Diagnostic only: the gate is
/// never forced open, because another caller may legitimately hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockProbe {
    Available,
    HeldElsewhere,
}

impl OperationGate {
    pub fn new(class: OpClass) -> Self {
        Self {
            class,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    /// Blocks up to `wait` for the gate; a timeout is a typed, non-fatal
    /// error and the caller is expected to retry later or call [`reset`].
    ///
    /// [`reset`]: OperationGate::reset
    pub async fn acquire(&self, wait: Duration) -> Result<OperationPermit> {
        let waited_ms = wait.as_millis() as u64;
        match timeout(wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(class = %self.class, "operation gate acquired");
                Ok(OperationPermit {
                    class: self.class,
                    _permit: permit,
                })
            }
            Ok(Err(_)) => Err(BridgeError::internal(format!(
                "{} gate was closed while waiting",
                self.class
            ))),
            Err(_) => {
                warn!(class = %self.class, waited_ms, "operation gate acquisition timed out");
                Err(BridgeError::LockAcquisitionTimeout {
                    class: self.class,
                    waited_ms,
                })
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Recovery probe: confirms availability via a non-blocking
    /// acquire/release, or reports that the gate is held elsewhere. This is
    /// not a guaranteed unlock and must never be treated as authoritative.
    pub fn reset(&self) -> LockProbe {
        match self.permits.try_acquire() {
            Ok(permit) => {
                drop(permit);
                debug!(class = %self.class, "reset probe: gate available");
                LockProbe::Available
            }
            Err(_) => {
                warn!(class = %self.class, "reset probe: gate held elsewhere; not forcing");
                LockProbe::HeldElsewhere
            }
        }
    }

    /// Waits for same-class activity started outside this bridge to finish,
    /// polling `probe` every `poll_interval`, bounded by `max_wait`.
    pub async fn wait_for_external(
        &self,
        probe: &dyn ActivityProbe,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        if !probe.in_progress() {
            return Ok(());
        }
        debug!(class = %self.class, "waiting for externally triggered activity to finish");
        let deadline = Instant::now() + max_wait;
        loop {
            sleep(poll_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
            if !probe.in_progress() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let waited_ms = max_wait.as_millis() as u64;
                warn!(class = %self.class, waited_ms, "externally triggered activity did not finish in time");
                return Err(BridgeError::UpstreamActivityTimeout {
                    class: self.class,
                    waited_ms,
                });
            }
        }
    }
}

/// One gate per operation class, constructed with the service.
#[derive(Clone)]
pub struct OperationLocks {
    pub build: OperationGate,
    pub test: OperationGate,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self {
            build: OperationGate::new(OpClass::Build),
            test: OperationGate::new(OpClass::Test),
        }
    }

    pub fn gate(&self, class: OpClass) -> &OperationGate {
        match class {
            OpClass::Build => &self.build,
            OpClass::Test => &self.test,
        }
    }
}

impl Default for OperationLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let gate = OperationGate::new(OpClass::Build);
        let permit = gate.acquire(Duration::from_millis(50)).await.expect("first");
        assert!(gate.is_locked());

        let denied = gate.acquire(Duration::from_millis(50)).await;
        assert_matches!(
            denied,
            Err(BridgeError::LockAcquisitionTimeout {
                class: OpClass::Build,
                ..
            })
        );

        drop(permit);
        assert!(!gate.is_locked());
        gate.acquire(Duration::from_millis(50)).await.expect("after release");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquirers_serialize() {
        let gate = Arc::new(OperationGate::new(OpClass::Test));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire(Duration::from_secs(5)).await.expect("acquire");
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_reports_without_forcing() {
        let gate = OperationGate::new(OpClass::Build);
        assert_eq!(gate.reset(), LockProbe::Available);

        let permit = gate.acquire(Duration::from_millis(50)).await.expect("acquire");
        assert_eq!(gate.reset(), LockProbe::HeldElsewhere);
        // the probe must not have released the holder's permit
        assert!(gate.is_locked());
        drop(permit);
        assert_eq!(gate.reset(), LockProbe::Available);
    }

    #[tokio::test]
    async fn external_activity_wait_finishes_when_probe_clears() {
        let gate = OperationGate::new(OpClass::Build);
        let remaining = Arc::new(AtomicUsize::new(3));
        let probe = {
            let remaining = Arc::clone(&remaining);
            move || remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        };
        gate.wait_for_external(&probe, Duration::from_secs(1), Duration::from_millis(5))
            .await
            .expect("activity settles");
    }

    #[tokio::test]
    async fn external_activity_wait_is_bounded() {
        let gate = OperationGate::new(OpClass::Build);
        let probe = || true;
        let result = gate
            .wait_for_external(&probe, Duration::from_millis(60), Duration::from_millis(10))
            .await;
        assert_matches!(
            result,
            Err(BridgeError::UpstreamActivityTimeout {
                class: OpClass::Build,
                ..
            })
        );
    }
}
