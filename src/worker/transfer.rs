//! Transfer workers: one rsync invocation per job descriptor
//!
//! Each worker loops forever on the job queue: dequeue a descriptor,
//! run the external transfer tool synchronously against it, delete the
//! descriptor, mark the job done. The tool's exit status is captured
//! and handed to an injected result hook but deliberately does not
//! fail the pipeline: a failed transfer is visible only through the
//! per-job log file and the hook. Changing that policy would change
//! the tool's observable behavior (exit codes, retries), so it lives
//! behind the hook rather than in the worker loop.
//!
//! The running child process handle is parked in a shared slot so that
//! shutdown can kill it; without that, an interrupt would block behind
//! an arbitrarily long rsync run.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::queue::JobReceiver;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// rsync flag set: preserve links/owner/times/group/devices, log
/// deletions, use relative paths (required with --files-from)
pub const RSYNC_FLAGS: &str = "-lotgoDR";

/// Suffix appended to a descriptor path to form its per-job log path
pub const LOG_SUFFIX: &str = "-rsync-log.txt";

/// How long a worker waits on the queue before rechecking its stop flag
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Polling period while waiting on a running child process
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Published state of one worker, read by the status reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting on the job queue
    Idle = 0,
    /// Running a transfer invocation
    Transferring = 1,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            _ => WorkerState::Transferring,
        }
    }

    /// Single-character form for the status line strip
    pub fn glyph(self) -> char {
        match self {
            WorkerState::Idle => '-',
            WorkerState::Transferring => 'o',
        }
    }
}

/// Atomic cell a worker publishes its state through
#[derive(Debug)]
pub struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Idle as u8))
    }

    fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    /// Read the current state snapshot
    pub fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// Outcome of one transfer invocation, handed to the result hook
#[derive(Debug)]
pub struct JobResult {
    /// Worker that ran the job
    pub worker_id: usize,
    /// Job descriptor path (deleted right after the hook runs)
    pub job_path: PathBuf,
    /// Per-job rsync log path
    pub log_path: PathBuf,
    /// Exit status of the invocation; None if the tool could not be
    /// spawned at all
    pub exit_status: Option<ExitStatus>,
}

/// Callback invoked with every completed job
pub type ResultHook = Arc<dyn Fn(&JobResult) + Send + Sync>;

/// A single transfer worker
pub struct TransferWorker {
    id: usize,
    config: Arc<SyncConfig>,
    state: Arc<WorkerStateCell>,
    child_slot: Arc<Mutex<Option<Child>>>,
    stop: Arc<AtomicBool>,
    on_result: Option<ResultHook>,
}

impl TransferWorker {
    /// Worker loop: drain the queue until the pool signals stop
    fn run(&self, jobs: JobReceiver) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let Some(job) = jobs.get_timeout(DEQUEUE_TIMEOUT) else {
                continue;
            };

            self.state.store(WorkerState::Transferring);
            self.process_job(&job);
            jobs.task_done();
            self.state.store(WorkerState::Idle);
        }
    }

    /// Run one transfer invocation and clean up its descriptor.
    /// Never fails: any invocation outcome is accepted and the
    /// pipeline proceeds.
    fn process_job(&self, job: &Path) {
        let log_path = PathBuf::from(format!("{}{}", job.display(), LOG_SUFFIX));
        tracing::info!(worker = self.id, job = %job.display(), "starting transfer");

        let mut command = Command::new(&self.config.rsync_program);
        command
            .arg(format!("--files-from={}", job.display()))
            .arg(RSYNC_FLAGS)
            .arg(format!("--log-file={}", log_path.display()))
            .arg(&self.config.base_dir)
            .arg(&self.config.destination);

        let exit_status = match command.spawn() {
            Ok(child) => {
                *self.child_slot.lock().expect("child slot poisoned") = Some(child);
                self.wait_for_child()
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    program = %self.config.rsync_program,
                    error = %e,
                    "failed to spawn transfer tool"
                );
                None
            }
        };

        if let Some(status) = exit_status {
            if status.success() {
                tracing::debug!(worker = self.id, job = %job.display(), "transfer finished");
            } else {
                tracing::warn!(
                    worker = self.id,
                    job = %job.display(),
                    %status,
                    log = %log_path.display(),
                    "transfer exited with failure; see per-job log"
                );
            }
        }

        let result = JobResult {
            worker_id: self.id,
            job_path: job.to_path_buf(),
            log_path,
            exit_status,
        };
        if let Some(hook) = &self.on_result {
            hook(&result);
        }

        // The descriptor is deleted whether or not the transfer
        // succeeded; the queue only tracks that the job was handled.
        if let Err(e) = fs::remove_file(job) {
            tracing::warn!(job = %job.display(), error = %e, "failed to remove job descriptor");
        }
    }

    /// Wait for the parked child to exit, polling so that shutdown's
    /// kill (which takes the same slot) is observed promptly
    fn wait_for_child(&self) -> Option<ExitStatus> {
        loop {
            {
                let mut slot = self.child_slot.lock().expect("child slot poisoned");
                match slot.as_mut() {
                    Some(child) => {
                        // The pool's kill pass can run before this job's
                        // child is parked in the slot; re-check the stop
                        // flag here so such a child is still killed and
                        // shutdown latency stays bounded.
                        if self.stop.load(Ordering::Relaxed) {
                            if let Err(e) = child.kill() {
                                tracing::debug!(
                                    worker = self.id,
                                    error = %e,
                                    "kill on transfer child failed"
                                );
                            }
                        }
                        match child.try_wait() {
                            Ok(Some(status)) => {
                                *slot = None;
                                return Some(status);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(worker = self.id, error = %e, "wait on child failed");
                                *slot = None;
                                return None;
                            }
                        }
                    }
                    None => return None,
                }
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }
}

/// Fixed-size pool of transfer workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    states: Vec<Arc<WorkerStateCell>>,
    child_slots: Vec<Arc<Mutex<Option<Child>>>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers draining `jobs`
    pub fn spawn(
        config: Arc<SyncConfig>,
        jobs: JobReceiver,
        on_result: Option<ResultHook>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(config.worker_count);
        let mut states = Vec::with_capacity(config.worker_count);
        let mut child_slots = Vec::with_capacity(config.worker_count);

        for id in 0..config.worker_count {
            let state = Arc::new(WorkerStateCell::new());
            let child_slot = Arc::new(Mutex::new(None));
            states.push(Arc::clone(&state));
            child_slots.push(Arc::clone(&child_slot));

            let worker = TransferWorker {
                id,
                config: Arc::clone(&config),
                state,
                child_slot,
                stop: Arc::clone(&stop),
                on_result: on_result.clone(),
            };
            let jobs = jobs.clone();

            let handle = thread::Builder::new()
                .name(format!("transfer-{id}"))
                .spawn(move || worker.run(jobs))
                .map_err(SyncError::Io)?;
            handles.push(handle);
        }

        Ok(Self {
            handles,
            states,
            child_slots,
            stop,
        })
    }

    /// Snapshot of every worker's published state
    pub fn states(&self) -> Vec<WorkerState> {
        self.states.iter().map(|cell| cell.load()).collect()
    }

    /// Shared state cells, for the snapshot thread
    pub fn state_cells(&self) -> Vec<Arc<WorkerStateCell>> {
        self.states.clone()
    }

    /// Signal every worker to stop and kill any in-flight transfer
    /// child, so shutdown latency stays bounded
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        for slot in &self.child_slots {
            if let Some(child) = slot.lock().expect("child slot poisoned").as_mut() {
                if let Err(e) = child.kill() {
                    tracing::debug!(error = %e, "kill on transfer child failed");
                }
            }
        }
    }

    /// Wait for every worker thread to exit
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
