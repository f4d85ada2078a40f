//! Run registry lifecycle against real processes.

#![cfg(unix)]

use tokio::time::Duration;
use tokio::time::Instant;
use tokio::time::sleep;

use hostbridge_core::BridgeError;
use hostbridge_core::ProjectModel;
use hostbridge_core::RunRegistry;
use hostbridge_core::host::RunSpec;
use hostbridge_core::output_buffer::TRUNCATION_NOTICE;
use hostbridge_core::run_registry::StopOutcome;

/// Resolves every configuration name as a bash command line.
struct ShellProject;

impl ProjectModel for ShellProject {
    fn project_open(&self) -> bool {
        true
    }

    fn resolve_run(&self, config_name: &str, _project_ref: Option<&str>) -> anyhow::Result<RunSpec> {
        Ok(RunSpec {
            program: "/bin/bash".to_string(),
            args: vec!["-c".to_string(), config_name.to_string()],
            cwd: None,
            env: Vec::new(),
            project_name: "demo".to_string(),
        })
    }
}

/// Resolves to a binary that cannot exist.
struct BrokenProject;

impl ProjectModel for BrokenProject {
    fn project_open(&self) -> bool {
        true
    }

    fn resolve_run(&self, _config_name: &str, _project_ref: Option<&str>) -> anyhow::Result<RunSpec> {
        Ok(RunSpec {
            program: "/nonexistent/launcher".to_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            project_name: "demo".to_string(),
        })
    }
}

async fn wait_until_terminated(registry: &RunRegistry, run_id: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let read = registry.output(run_id, false).await.expect("known run");
        if !read.running {
            return;
        }
        assert!(Instant::now() < deadline, "run {run_id} did not terminate");
        sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_ids_are_unique_and_strictly_increasing() {
    let registry = RunRegistry::new(64 * 1024);
    let mut seqs = Vec::new();
    for _ in 0..3 {
        let id = registry
            .start(&ShellProject, "true", None)
            .await
            .expect("start");
        let seq: u64 = id
            .strip_prefix("run-")
            .and_then(|raw| raw.parse().ok())
            .expect("id shape");
        seqs.push(seq);
    }
    assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleared_reads_never_overlap() {
    let registry = RunRegistry::new(64 * 1024);
    let id = registry
        .start(
            &ShellProject,
            "printf 'alpha\\n'; sleep 0.4; printf 'omega\\n'",
            None,
        )
        .await
        .expect("start");

    // give the first line time to arrive, then drain it
    sleep(Duration::from_millis(200)).await;
    let first = registry.output(&id, true).await.expect("first read");
    assert!(first.output.contains("alpha"), "got: {:?}", first.output);
    assert!(!first.output.contains("omega"));

    wait_until_terminated(&registry, &id).await;
    let second = registry.output(&id, true).await.expect("second read");
    assert!(second.output.contains("omega"), "got: {:?}", second.output);
    assert!(
        !second.output.contains("alpha"),
        "drained text reappeared: {:?}",
        second.output
    );
    assert_eq!(second.exit_code, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_terminates_and_is_idempotent() {
    let registry = RunRegistry::new(64 * 1024);
    let id = registry
        .start(&ShellProject, "sleep 30", None)
        .await
        .expect("start");

    let first = registry.stop(&id).await.expect("stop");
    assert_eq!(first, StopOutcome::Stopped);

    wait_until_terminated(&registry, &id).await;
    let read = registry.output(&id, false).await.expect("read");
    assert!(!read.running);
    // killed, not a clean exit
    assert!(read.exit_code.is_some_and(|code| code != 0));

    let second = registry.stop(&id).await.expect("stop again");
    assert_eq!(second, StopOutcome::AlreadyTerminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prune_removes_only_old_terminated_runs() {
    let registry = RunRegistry::new(64 * 1024);
    let long_lived = registry
        .start(&ShellProject, "sleep 30", None)
        .await
        .expect("start long");
    let short_lived = registry
        .start(&ShellProject, "true", None)
        .await
        .expect("start short");

    wait_until_terminated(&registry, &short_lived).await;
    registry.prune(Duration::ZERO).await;

    let runs = registry.list().await;
    let ids: Vec<&str> = runs.iter().map(|summary| summary.run_id.as_str()).collect();
    assert!(ids.contains(&long_lived.as_str()), "running run was pruned");
    assert!(!ids.contains(&short_lived.as_str()));

    registry.stop(&long_lived).await.expect("cleanup");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_output_is_truncated_not_unbounded() {
    let registry = RunRegistry::new(512);
    let id = registry
        .start(&ShellProject, "head -c 50000 /dev/zero | tr '\\0' 'x'", None)
        .await
        .expect("start");

    wait_until_terminated(&registry, &id).await;
    let read = registry.output(&id, false).await.expect("read");
    assert!(read.output.len() <= 512, "buffer overflowed the cap");
    assert!(read.output.contains(TRUNCATION_NOTICE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runs_honor_resolved_cwd_and_env() {
    struct PinnedProject {
        dir: std::path::PathBuf,
    }

    impl ProjectModel for PinnedProject {
        fn project_open(&self) -> bool {
            true
        }

        fn resolve_run(
            &self,
            config_name: &str,
            _project_ref: Option<&str>,
        ) -> anyhow::Result<RunSpec> {
            Ok(RunSpec {
                program: "/bin/bash".to_string(),
                args: vec!["-c".to_string(), config_name.to_string()],
                cwd: Some(self.dir.clone()),
                env: vec![("BRIDGE_MARK".to_string(), "pinned".to_string())],
                project_name: "demo".to_string(),
            })
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let canonical = dir.path().canonicalize().expect("canonicalize");
    let project = PinnedProject {
        dir: dir.path().to_path_buf(),
    };

    let registry = RunRegistry::new(64 * 1024);
    let id = registry
        .start(&project, "pwd; printf \"%s\\n\" \"$BRIDGE_MARK\"", None)
        .await
        .expect("start");

    wait_until_terminated(&registry, &id).await;
    let read = registry.output(&id, false).await.expect("read");
    assert!(
        read.output.contains(&canonical.display().to_string()),
        "cwd was not applied: {:?}",
        read.output
    );
    assert!(read.output.contains("pinned"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_launch_is_typed_and_left_inspectable() {
    let registry = RunRegistry::new(64 * 1024);
    let err = registry
        .start(&BrokenProject, "Server", None)
        .await
        .expect_err("launch must fail");
    assert!(matches!(err, BridgeError::SpawnFailed { .. }));

    // the entry stays behind: not running, no exit code, launcher message captured
    let runs = registry.list().await;
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].running);
    assert_eq!(runs[0].exit_code, None);
    let read = registry
        .output(&runs[0].run_id, false)
        .await
        .expect("read failed run");
    assert!(read.output.contains("failed to start"));
}
