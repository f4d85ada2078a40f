//! Seams to the host development environment.
//!
//! The bridge never talks to the IDE directly; an embedder supplies these
//! traits. Callback-taking methods are invoked on the application context and
//! must resolve their [`Completion`] exactly once, either from the same call
//! or from any later host callback.

use std::path::PathBuf;

use hostbridge_protocol::CompilerMessage;

use crate::dispatch::Completion;
use crate::test_report::TestNode;

/// Fully resolved launch request for a run configuration.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Display name of the project the configuration belongs to.
    pub project_name: String,
}

/// Access to the host's project model.
pub trait ProjectModel: Send + Sync + 'static {
    fn project_open(&self) -> bool;

    /// Resolves a run configuration name into a launchable [`RunSpec`].
    /// Errors are embedder faults (unknown configuration, broken SDK path)
    /// and surface as a typed start failure.
    fn resolve_run(&self, config_name: &str, project_ref: Option<&str>) -> anyhow::Result<RunSpec>;
}

/// What the host reports when a compile finishes.
#[derive(Debug, Clone)]
pub struct BuildFinished {
    pub success: bool,
    pub aborted: bool,
    pub errors: Vec<CompilerMessage>,
    pub warnings: Vec<CompilerMessage>,
}

/// The host's build system.
pub trait BuildHost: Send + Sync + 'static {
    /// Whether compile-class activity is currently running, including builds
    /// the host triggered on its own (file-watch, UI action).
    fn compile_in_progress(&self) -> bool;

    fn start_build(
        &self,
        incremental: bool,
        project_ref: Option<String>,
        done: Completion<BuildFinished>,
    );
}

/// Exit of the process backing a test operation. The structured result tree
/// usually materializes *after* this, via the host's reporting pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TestProcessExit {
    pub exit_code: i32,
    pub aborted: bool,
}

/// The host's test harness.
pub trait TestHost: Send + Sync + 'static {
    fn start_tests(
        &self,
        pattern: String,
        project_ref: Option<String>,
        done: Completion<TestProcessExit>,
    );

    /// Snapshot of the asynchronously populated result tree. `None` until the
    /// reporting pipeline has produced it; an `Err` is a pipeline fault.
    fn report(&self) -> anyhow::Result<Option<TestNode>>;
}
