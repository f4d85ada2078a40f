//! The process-wide service object.
//!
//! Everything shared (context, gates, registry, result cache) lives here,
//! explicitly constructed and passed by reference to handlers. There is no
//! ambient global state, and `shutdown` is the explicit end of life.

use std::sync::Arc;

use tokio::time::Duration;

use hostbridge_protocol::RunSummary;

use crate::config::BridgeConfig;
use crate::debug::DebugFacade;
use crate::debug::DebugHost;
use crate::dispatch::AppContext;
use crate::error::Result;
use crate::host::BuildHost;
use crate::host::ProjectModel;
use crate::host::TestHost;
use crate::op_lock::OperationLocks;
use crate::result_cache::ResultCache;
use crate::run_registry::RunOutputRead;
use crate::run_registry::RunRegistry;
use crate::run_registry::StopOutcome;

/// The host-environment implementations an embedder plugs in.
pub struct HostSeams {
    pub project: Arc<dyn ProjectModel>,
    pub build: Arc<dyn BuildHost>,
    pub test: Arc<dyn TestHost>,
    pub debug: Arc<dyn DebugHost>,
}

pub struct BridgeService {
    pub(crate) config: BridgeConfig,
    pub(crate) ctx: AppContext,
    pub(crate) locks: OperationLocks,
    pub(crate) runs: RunRegistry,
    pub(crate) results: ResultCache,
    pub(crate) project: Arc<dyn ProjectModel>,
    pub(crate) build_host: Arc<dyn BuildHost>,
    pub(crate) test_host: Arc<dyn TestHost>,
    debug: DebugFacade,
}

impl BridgeService {
    pub fn new(config: BridgeConfig, seams: HostSeams) -> Self {
        let config = config.normalized();
        let ctx = AppContext::new();
        let debug = DebugFacade::new(ctx.clone(), seams.debug, config.debug_call_timeout());
        Self {
            ctx,
            locks: OperationLocks::new(),
            runs: RunRegistry::new(config.output_buffer_bytes),
            results: ResultCache::new(),
            project: seams.project,
            build_host: seams.build,
            test_host: seams.test,
            debug,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The per-class gates, exposed for `is_locked` probes and `reset`.
    pub fn locks(&self) -> &OperationLocks {
        &self.locks
    }

    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    pub fn debug(&self) -> &DebugFacade {
        &self.debug
    }

    pub async fn start_run(&self, config_name: &str, project_ref: Option<&str>) -> Result<String> {
        self.runs
            .start(self.project.as_ref(), config_name, project_ref)
            .await
    }

    pub async fn run_output(&self, run_id: &str, clear: bool) -> Result<RunOutputRead> {
        self.runs.output(run_id, clear).await
    }

    pub async fn stop_run(&self, run_id: &str) -> Result<StopOutcome> {
        self.runs.stop(run_id).await
    }

    pub async fn list_runs(&self) -> Vec<RunSummary> {
        self.runs.list().await
    }

    /// Prunes terminated runs older than `max_age` (the configured retention
    /// when `None`).
    pub async fn prune_runs(&self, max_age: Option<Duration>) {
        let max_age = max_age.unwrap_or_else(|| self.config.run_retention());
        self.runs.prune(max_age).await;
    }

    /// Stops accepting dispatched work and waits for in-flight jobs. Calls
    /// after this fail with `ContextUnavailable`.
    pub async fn shutdown(&self) {
        self.ctx.shutdown().await;
    }
}
