//! Registry of externally launched, independently tracked processes.
//!
//! Each run owns its backing process (through a supervision task), captures
//! bounded output under a per-run lock, and converges explicit stop requests
//! and natural exits onto one terminal state: `running == false` with the
//! exit code set.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use hostbridge_protocol::RunSummary;

use crate::dispatch::lock_or_recover;
use crate::error::BridgeError;
use crate::error::Result;
use crate::host::ProjectModel;
use crate::host::RunSpec;
use crate::output_buffer::OutputBuffer;

const READ_CHUNK_SIZE: usize = 8192; // bytes per pipe read
const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal

/// One tracked process invocation.
pub struct Run {
    id: String,
    seq: u64,
    config_name: String,
    project_name: String,
    started_at: DateTime<Utc>,
    started: Instant,
    /// Per-run lock: concurrent reads/writes to different runs never contend.
    buffer: StdMutex<OutputBuffer>,
    exit_code: StdMutex<Option<i32>>,
    running: AtomicBool,
    kill: StdMutex<Option<oneshot::Sender<()>>>,
}

impl Run {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> Option<i32> {
        *lock_or_recover(&self.exit_code)
    }

    pub fn summary(&self) -> RunSummary {
        // running is read first: the terminal writer sets the exit code
        // before flipping the flag, so a false here implies the code is set
        // (or the process never started).
        let running = self.running();
        RunSummary {
            run_id: self.id.clone(),
            config_name: self.config_name.clone(),
            project_name: self.project_name.clone(),
            start_time: self.started_at,
            running,
            exit_code: self.exit_code(),
        }
    }

    fn append_output(&self, chunk: &str) {
        lock_or_recover(&self.buffer).append(chunk);
    }

    /// Terminal-state writer; sole place `running` flips to false after a
    /// launch succeeded.
    fn mark_exited(&self, code: i32) {
        *lock_or_recover(&self.exit_code) = Some(code);
        self.running.store(false, Ordering::SeqCst);
    }

    fn mark_start_failed(&self, message: &str) {
        self.append_output(message);
        self.running.store(false, Ordering::SeqCst);
    }

    fn take_kill(&self) -> Option<oneshot::Sender<()>> {
        lock_or_recover(&self.kill).take()
    }

    fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What a read of a run's output observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutputRead {
    pub output: String,
    pub running: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Termination was requested (or had already been requested).
    Stopped,
    AlreadyTerminated,
}

struct RegistryInner {
    next_seq: AtomicU64,
    runs: Mutex<HashMap<String, Arc<Run>>>,
    output_cap: usize,
}

/// Concurrent map from run ids to [`Run`] records. Cloning shares the map.
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<RegistryInner>,
}

impl RunRegistry {
    pub fn new(output_cap: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_seq: AtomicU64::new(1),
                runs: Mutex::new(HashMap::new()),
                output_cap,
            }),
        }
    }

    /// Resolves `config_name` through the project model, registers the run,
    /// launches the process, and returns the id as soon as the process is
    /// observed started; completion is tracked independently.
    ///
    /// A failed launch leaves the entry behind with `running == false`, no
    /// exit code, and the launcher's message in the buffer, so the failure
    /// stays inspectable until pruned.
    pub async fn start(
        &self,
        project: &dyn ProjectModel,
        config_name: &str,
        project_ref: Option<&str>,
    ) -> Result<String> {
        if !project.project_open() {
            return Err(BridgeError::NoProjectOpen);
        }
        let spec = project.resolve_run(config_name, project_ref).map_err(|source| {
            BridgeError::SpawnFailed {
                config_name: config_name.to_string(),
                source,
            }
        })?;

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let run = Arc::new(Run {
            id: format!("run-{seq}"),
            seq,
            config_name: config_name.to_string(),
            project_name: spec.project_name.clone(),
            started_at: Utc::now(),
            started: Instant::now(),
            buffer: StdMutex::new(OutputBuffer::new(self.inner.output_cap)),
            exit_code: StdMutex::new(None),
            running: AtomicBool::new(true),
            kill: StdMutex::new(None),
        });

        // The entry (and with it the output buffer and listeners) exists
        // before the process can produce anything observable.
        let id = run.id.clone();
        self.inner
            .runs
            .lock()
            .await
            .insert(id.clone(), Arc::clone(&run));

        let mut child = match build_command(&spec).spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(run_id = %id, config = config_name, error = %err, "failed to start process");
                run.mark_start_failed(&format!("failed to start {}: {err}\n", spec.program));
                return Err(BridgeError::SpawnFailed {
                    config_name: config_name.to_string(),
                    source: err.into(),
                });
            }
        };

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_output(
                BufReader::new(stdout),
                Arc::clone(&run),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_output(
                BufReader::new(stderr),
                Arc::clone(&run),
            )));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        *lock_or_recover(&run.kill) = Some(kill_tx);
        tokio::spawn(supervise(Arc::clone(&run), child, kill_rx, readers));

        debug!(run_id = %id, config = config_name, "run started");
        Ok(id)
    }

    async fn get(&self, run_id: &str) -> Result<Arc<Run>> {
        let runs = self.inner.runs.lock().await;
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| BridgeError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Reads captured output. With `clear` the buffer is drained atomically,
    /// so consecutive cleared reads never overlap.
    pub async fn output(&self, run_id: &str, clear: bool) -> Result<RunOutputRead> {
        let run = self.get(run_id).await?;
        let running = run.running();
        let exit_code = run.exit_code();
        let output = {
            let mut buffer = lock_or_recover(&run.buffer);
            if clear { buffer.drain() } else { buffer.snapshot() }
        };
        Ok(RunOutputRead {
            output,
            running,
            exit_code,
        })
    }

    /// Requests termination of the backing process. Idempotent: repeated
    /// stops of a dying run are acknowledged, a terminated run reports
    /// [`StopOutcome::AlreadyTerminated`].
    pub async fn stop(&self, run_id: &str) -> Result<StopOutcome> {
        let run = self.get(run_id).await?;
        if !run.running() {
            return Ok(StopOutcome::AlreadyTerminated);
        }
        if let Some(kill) = run.take_kill() {
            // the supervision task owns the child; it observes this and kills
            let _ = kill.send(());
            debug!(run_id, "stop requested");
        }
        Ok(StopOutcome::Stopped)
    }

    /// Snapshot of all registered runs, ordered by start sequence.
    pub async fn list(&self) -> Vec<RunSummary> {
        let runs = self.inner.runs.lock().await;
        let mut entries: Vec<&Arc<Run>> = runs.values().collect();
        entries.sort_by_key(|run| run.seq);
        entries.iter().map(|run| run.summary()).collect()
    }

    /// Removes terminated entries older than `max_age`. Running entries are
    /// never removed, regardless of age.
    pub async fn prune(&self, max_age: Duration) {
        let mut runs = self.inner.runs.lock().await;
        runs.retain(|run_id, run| {
            let keep = run.running() || run.age() <= max_age;
            if !keep {
                debug!(run_id = %run_id, "pruned terminated run");
            }
            keep
        });
    }

    pub async fn len(&self) -> usize {
        self.inner.runs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.runs.lock().await.is_empty()
    }
}

fn build_command(spec: &RunSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    command
}

async fn pump_output<R: AsyncRead + Unpin>(mut reader: R, run: Arc<Run>) {
    let mut tmp = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => run.append_output(&String::from_utf8_lossy(&tmp[..n])),
            Err(err) => {
                debug!(run_id = %run.id, error = %err, "output pipe closed with error");
                break;
            }
        }
    }
}

/// Owns the child for its whole life. Stop requests and natural exit both
/// land here, so there is exactly one terminal-state writer and no ordering
/// assumption between "stop acknowledged" and "termination observed".
async fn supervise(
    run: Arc<Run>,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(err) = child.start_kill() {
                warn!(run_id = %run.id, error = %err, "kill request failed");
            }
            child.wait().await
        }
    };

    // flush whatever the pipes still hold before declaring the terminal state
    for reader in readers {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => exit_code_of(status),
        Err(err) => {
            warn!(run_id = %run.id, error = %err, "could not observe process exit");
            -1
        }
    };
    run.mark_exited(code);
    debug!(run_id = %run.id, exit_code = code, "run terminated");
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return EXIT_CODE_SIGNAL_BASE + signal;
            }
        }
        -1
    })
}
