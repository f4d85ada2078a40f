//! Build and test orchestration.
//!
//! The flow for both classes: project-open check, clear the class's result
//! slot, wait out externally triggered activity, acquire the class gate,
//! dispatch onto the application context, block with the class timeout. The
//! gate permit is a guard, so the lock is released on every path: success,
//! failure, or timeout.

use std::sync::Arc;

use tokio::time::Duration;
use tokio::time::Instant;
use tracing::info;

use hostbridge_protocol::BuildOutcome;
use hostbridge_protocol::TestOutcome;

use crate::dispatch::await_completion;
use crate::error::BridgeError;
use crate::error::Result;
use crate::op_lock::OpClass;
use crate::service::BridgeService;
use crate::test_report::RetryPolicy;
use crate::test_report::extract_with_retry;

impl BridgeService {
    /// Runs a build and blocks until the host signals completion or the
    /// timeout elapses. Strictly serialized against other build requests.
    pub async fn build(
        &self,
        incremental: bool,
        timeout_override: Option<Duration>,
        project_ref: Option<String>,
    ) -> Result<BuildOutcome> {
        if !self.project.project_open() {
            return Err(BridgeError::NoProjectOpen);
        }
        // cleared up front so a long build never serves its predecessor's result
        self.results.clear(OpClass::Build);

        let gate = &self.locks.build;
        gate.wait_for_external(
            &|| self.build_host.compile_in_progress(),
            self.config.external_activity_max_wait(),
            self.config.external_activity_poll(),
        )
        .await?;
        let _permit = gate.acquire(self.config.lock_wait()).await?;

        let wait = timeout_override.unwrap_or_else(|| self.config.build_timeout());
        let started = Instant::now();
        let host = Arc::clone(&self.build_host);
        let finished = await_completion(&self.ctx, "build", wait, move |done| {
            host.start_build(incremental, project_ref, done)
        })
        .await?;

        let outcome = BuildOutcome {
            success: finished.success && !finished.aborted,
            errors: finished.errors,
            warnings: finished.warnings,
            time_ms: started.elapsed().as_millis() as u64,
            aborted: finished.aborted,
        };
        info!(
            success = outcome.success,
            errors = outcome.errors.len(),
            time_ms = outcome.time_ms,
            "build finished"
        );
        self.results.store_build(outcome.clone());
        Ok(outcome)
    }

    /// Runs the tests matching `pattern`, then extracts the result tree with
    /// the bounded retry budget. Waits for compile-class activity (even
    /// activity triggered outside this bridge) before proceeding, so tests
    /// never run against an inconsistent build.
    pub async fn test(
        &self,
        pattern: String,
        timeout_override: Option<Duration>,
        project_ref: Option<String>,
    ) -> Result<TestOutcome> {
        if !self.project.project_open() {
            return Err(BridgeError::NoProjectOpen);
        }
        self.results.clear(OpClass::Test);

        self.locks
            .build
            .wait_for_external(
                &|| self.build_host.compile_in_progress(),
                self.config.external_activity_max_wait(),
                self.config.external_activity_poll(),
            )
            .await?;
        let _permit = self.locks.test.acquire(self.config.lock_wait()).await?;

        let wait = timeout_override.unwrap_or_else(|| self.config.test_timeout());
        let started = Instant::now();
        let host = Arc::clone(&self.test_host);
        let exit = await_completion(&self.ctx, "test run", wait, move |done| {
            host.start_tests(pattern, project_ref, done)
        })
        .await?;

        let policy = RetryPolicy {
            max_attempts: self.config.extraction_max_attempts,
            delay: self.config.extraction_delay(),
        };
        let host = Arc::clone(&self.test_host);
        let cases = extract_with_retry(&policy, move || host.report(), exit.exit_code).await?;

        let success = !exit.aborted && cases.iter().all(|case| !case.status.is_defect());
        let outcome = TestOutcome {
            success,
            tests: cases,
            time_ms: started.elapsed().as_millis() as u64,
            aborted: exit.aborted,
        };
        info!(
            success = outcome.success,
            cases = outcome.tests.len(),
            time_ms = outcome.time_ms,
            "test run finished"
        );
        self.results.store_test(outcome.clone());
        Ok(outcome)
    }
}
