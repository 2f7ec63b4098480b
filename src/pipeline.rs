//! Pipeline wiring: scanner thread, worker pool, progress snapshots
//!
//! `run` owns the lifecycle of one synchronization: it creates the
//! scratch directory and the job queue, spawns the worker pool and the
//! scanner thread, and drives a snapshot thread that hands immutable
//! [`PipelineProgress`] values to the caller's callback on a fixed
//! interval. The call returns once the scanner has finished walking
//! and every submitted job has been processed, or promptly with
//! [`SyncError::Interrupted`] when the shutdown flag is raised.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::queue::JobQueue;
use crate::scan::{ScanPhase, Scanner};
use crate::worker::{JobResult, ResultHook, WorkerPool, WorkerState};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Snapshot interval for the progress callback
const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

/// Immutable progress snapshot handed to the progress callback
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    /// Scanner lifecycle phase
    pub phase: ScanPhase,
    /// Entries discovered so far
    pub files_added: u64,
    /// Bytes discovered so far
    pub bytes_added: u64,
    /// Job descriptors submitted so far
    pub jobs_submitted: u64,
    /// Jobs fully processed by workers so far
    pub jobs_completed: u64,
    /// Jobs whose transfer invocation exited non-zero or failed to spawn
    pub transfer_failures: u64,
    /// Jobs currently queued (excludes in-flight jobs)
    pub queue_len: usize,
    /// Per-worker state strip
    pub worker_states: Vec<WorkerState>,
    /// Time since the pipeline started
    pub elapsed: Duration,
}

/// Final statistics for one synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Entries discovered (files plus synthesized directories)
    pub files_added: u64,
    /// Bytes discovered
    pub bytes_added: u64,
    /// Empty directories synthesized as entries
    pub dirs_synthesized: u64,
    /// Job descriptors submitted
    pub jobs_submitted: u64,
    /// Jobs fully processed
    pub jobs_completed: u64,
    /// Transfer invocations that exited non-zero or failed to spawn
    pub transfer_failures: u64,
    /// Entries skipped because stat/readdir failed
    pub stat_errors: u64,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Run the full pipeline to completion (or interruption)
pub fn run<F>(config: SyncConfig, shutdown: Arc<AtomicBool>, progress_callback: F) -> Result<SyncStats>
where
    F: Fn(PipelineProgress) + Send + 'static,
{
    let start = Instant::now();

    // Fatal before any thread starts: the scratch directory must exist.
    config.ensure_workdir()?;
    let config = Arc::new(config);

    let queue = Arc::new(JobQueue::new(config.queue_capacity));

    // The result hook keeps the "ignore the exit status" policy in the
    // workers while still counting completions and failures for the
    // reporter.
    let jobs_completed = Arc::new(AtomicU64::new(0));
    let transfer_failures = Arc::new(AtomicU64::new(0));
    let hook: ResultHook = {
        let jobs_completed = Arc::clone(&jobs_completed);
        let transfer_failures = Arc::clone(&transfer_failures);
        Arc::new(move |result: &JobResult| {
            jobs_completed.fetch_add(1, Ordering::Relaxed);
            match result.exit_status {
                Some(status) if status.success() => {}
                _ => {
                    transfer_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    };

    let pool = WorkerPool::spawn(Arc::clone(&config), queue.receiver(), Some(hook))?;
    let scanner = Arc::new(Scanner::new(Arc::clone(&config), Arc::clone(&shutdown)));

    // Snapshot thread: polls atomic counters and state cells, hands
    // the callback an owned snapshot. Runs until the pipeline is done.
    let done = Arc::new(AtomicBool::new(false));
    let snapshot_handle = if config.show_progress {
        let scanner = Arc::clone(&scanner);
        let stats = scanner.stats();
        let queue = Arc::clone(&queue);
        let state_cells = pool.state_cells();
        let jobs_completed = Arc::clone(&jobs_completed);
        let transfer_failures = Arc::clone(&transfer_failures);
        let done = Arc::clone(&done);
        let shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || loop {
                let progress = PipelineProgress {
                    phase: scanner.phase(),
                    files_added: stats.files_added.load(Ordering::Relaxed),
                    bytes_added: stats.bytes_added.load(Ordering::Relaxed),
                    jobs_submitted: stats.jobs_submitted.load(Ordering::Relaxed),
                    jobs_completed: jobs_completed.load(Ordering::Relaxed),
                    transfer_failures: transfer_failures.load(Ordering::Relaxed),
                    queue_len: queue.len(),
                    worker_states: state_cells.iter().map(|c| c.load()).collect(),
                    elapsed: start.elapsed(),
                };
                progress_callback(progress);
                if done.load(Ordering::Relaxed) || shutdown.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(SNAPSHOT_INTERVAL);
            })
            .map_err(SyncError::Io)?;
        Some(handle)
    } else {
        None
    };

    // Scanner thread: walks, submits, then waits for the queue to
    // drain before returning.
    let scan_handle = {
        let scanner = Arc::clone(&scanner);
        let queue = Arc::clone(&queue);
        thread::Builder::new()
            .name("scanner".into())
            .spawn(move || scanner.run(&queue))
            .map_err(SyncError::Io)?
    };

    let scan_result = match scan_handle.join() {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("scanner thread panicked");
            Err(SyncError::ThreadPanicked { name: "scanner" })
        }
    };

    // Wind down: on success there is nothing in flight (the scanner
    // already waited for the queue join); on interrupt this kills any
    // running transfer child so termination stays bounded.
    pool.shutdown();
    pool.join();
    done.store(true, Ordering::SeqCst);
    if let Some(handle) = snapshot_handle {
        let _ = handle.join();
    }

    let scan_stats = scanner.stats();
    let stats = SyncStats {
        files_added: scan_stats.files_added.load(Ordering::Relaxed),
        bytes_added: scan_stats.bytes_added.load(Ordering::Relaxed),
        dirs_synthesized: scan_stats.dirs_synthesized.load(Ordering::Relaxed),
        jobs_submitted: scan_stats.jobs_submitted.load(Ordering::Relaxed),
        jobs_completed: jobs_completed.load(Ordering::Relaxed),
        transfer_failures: transfer_failures.load(Ordering::Relaxed),
        stat_errors: scan_stats.stat_errors.load(Ordering::Relaxed),
        duration: start.elapsed(),
    };

    scan_result.map(|()| stats)
}
