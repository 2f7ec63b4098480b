//! Filesystem scanner: walks source roots and emits job descriptors
//!
//! The scanner is the single producer of the pipeline. It walks each
//! source root depth-first, accumulates entries into a [`BatchBuilder`],
//! and whenever a batch is finalized writes it to a uniquely named job
//! descriptor in the scratch directory before enqueuing the descriptor
//! path. The enqueue blocks while a bounded queue is full, which is
//! the system's backpressure: the scanner stops producing descriptors
//! when the workers lag.
//!
//! Per-entry filesystem failures (a file vanishing between discovery
//! and stat, an unreadable directory) are counted and skipped; the
//! only fatal error inside the scanner is an I/O failure on the
//! scratch directory itself.

use crate::batch::{Batch, BatchBuilder, Entry};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::queue::{JobQueue, JobSender, PutTimeoutError};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Prefix for job descriptor file names (`parsync-<pid>-<seq>`)
pub const JOB_FILE_PREFIX: &str = "parsync";

/// Polling period for interruptible blocking operations
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scanner lifecycle phase, published for the status reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanPhase {
    /// Scanner constructed but not yet running
    Created = 0,
    /// Walking the source roots
    Scanning = 1,
    /// Writing a finalized batch to a job descriptor file
    WritingJob = 2,
    /// Blocking on the job queue (backpressure)
    Submitting = 3,
    /// Walk finished; waiting for the queue to drain
    Draining = 4,
    /// Every submitted job has been processed
    Completed = 5,
}

impl ScanPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ScanPhase::Created,
            1 => ScanPhase::Scanning,
            2 => ScanPhase::WritingJob,
            3 => ScanPhase::Submitting,
            4 => ScanPhase::Draining,
            _ => ScanPhase::Completed,
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Created => write!(f, "created"),
            ScanPhase::Scanning => write!(f, "scanning"),
            ScanPhase::WritingJob => write!(f, "writing job file"),
            ScanPhase::Submitting => write!(f, "submitting job"),
            ScanPhase::Draining => write!(f, "draining queue"),
            ScanPhase::Completed => write!(f, "completed"),
        }
    }
}

/// Cumulative scan counters, observable while the scan runs
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Entries discovered (files plus synthesized directories)
    pub files_added: AtomicU64,
    /// Bytes discovered (lstat sizes plus nominal directory sizes)
    pub bytes_added: AtomicU64,
    /// Empty directories synthesized as entries
    pub dirs_synthesized: AtomicU64,
    /// Job descriptors written and enqueued
    pub jobs_submitted: AtomicU64,
    /// Entries skipped because stat/readdir failed
    pub stat_errors: AtomicU64,
}

/// Walks source roots and turns them into a stream of job descriptors
pub struct Scanner {
    config: Arc<SyncConfig>,
    stats: Arc<ScanStats>,
    phase: AtomicU8,
    shutdown: Arc<AtomicBool>,
}

impl Scanner {
    /// Create a new scanner
    pub fn new(config: Arc<SyncConfig>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            config,
            stats: Arc::new(ScanStats::default()),
            phase: AtomicU8::new(ScanPhase::Created as u8),
            shutdown,
        }
    }

    /// Shared counters, for the snapshot thread
    pub fn stats(&self) -> Arc<ScanStats> {
        Arc::clone(&self.stats)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Walk every source root, submit all batches, then wait for the
    /// queue to drain completely (in-flight jobs included).
    pub fn run(&self, queue: &JobQueue) -> Result<()> {
        let sender = queue.sender();
        let mut builder = BatchBuilder::new(self.config.file_cap, self.config.size_cap_bytes);
        let mut seq: u64 = 0;

        self.set_phase(ScanPhase::Scanning);
        for root in &self.config.sources {
            self.walk_root(root, &mut builder, &mut seq, &sender)?;
        }

        // Flush the final, possibly under-cap batch.
        if !builder.is_empty() {
            self.submit(builder.take(), &mut seq, &sender)?;
        }

        self.set_phase(ScanPhase::Draining);
        while !queue.join_timeout(POLL_INTERVAL) {
            if self.interrupted() {
                return Err(SyncError::Interrupted);
            }
        }

        self.set_phase(ScanPhase::Completed);
        tracing::info!(
            files = self.stats.files_added.load(Ordering::Relaxed),
            bytes = self.stats.bytes_added.load(Ordering::Relaxed),
            jobs = seq,
            "scan complete"
        );
        Ok(())
    }

    /// Depth-first walk of one source root. Symlinks are never
    /// followed: a root that is itself a file or a symlink (even one
    /// pointing at a directory) becomes a single entry with its lstat
    /// size, recreated on the destination by the transfer tool.
    fn walk_root(
        &self,
        root: &str,
        builder: &mut BatchBuilder,
        seq: &mut u64,
        sender: &JobSender,
    ) -> Result<()> {
        let abs = self.config.base_dir.join(root);

        match fs::symlink_metadata(&abs) {
            Err(e) => {
                self.skip(&abs, &e.to_string());
                return Ok(());
            }
            Ok(md) if !md.is_dir() => {
                // A root that is itself a file (or symlink) is a
                // one-entry source.
                let entry = Entry::file(self.rel_path(&abs), md.len());
                return self.add_entry(entry, builder, seq, sender);
            }
            Ok(_) => {}
        }

        let mut stack = vec![abs];
        while let Some(dir) = stack.pop() {
            if self.interrupted() {
                return Err(SyncError::Interrupted);
            }

            let read = match fs::read_dir(&dir) {
                Ok(read) => read,
                Err(e) => {
                    self.skip(&dir, &e.to_string());
                    continue;
                }
            };

            let mut saw_entry = false;
            for dent in read {
                saw_entry = true;
                let dent = match dent {
                    Ok(dent) => dent,
                    Err(e) => {
                        self.skip(&dir, &e.to_string());
                        continue;
                    }
                };
                let file_type = match dent.file_type() {
                    Ok(ft) => ft,
                    Err(e) => {
                        self.skip(&dent.path(), &e.to_string());
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(dent.path());
                } else {
                    // DirEntry::metadata does not traverse symlinks,
                    // matching the lstat size the descriptor needs.
                    let size = match dent.metadata() {
                        Ok(md) => md.len(),
                        Err(e) => {
                            self.skip(&dent.path(), &e.to_string());
                            continue;
                        }
                    };
                    let entry = Entry::file(self.rel_path(&dent.path()), size);
                    self.add_entry(entry, builder, seq, sender)?;
                }
            }

            // A directory with neither files nor subdirectories would
            // otherwise vanish from the source set: synthesize an
            // entry for the directory itself.
            if !saw_entry {
                self.stats.dirs_synthesized.fetch_add(1, Ordering::Relaxed);
                let entry = Entry::directory(self.rel_path(&dir));
                self.add_entry(entry, builder, seq, sender)?;
            }
        }

        Ok(())
    }

    /// Route one discovered entry into the open batch
    fn add_entry(
        &self,
        entry: Entry,
        builder: &mut BatchBuilder,
        seq: &mut u64,
        sender: &JobSender,
    ) -> Result<()> {
        self.stats.files_added.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_added.fetch_add(entry.size, Ordering::Relaxed);

        // An entry bigger than the size cap goes out alone, leaving
        // the open batch undisturbed.
        if entry.size > self.config.size_cap_bytes {
            return self.submit(Batch::singleton(entry), seq, sender);
        }

        if !builder.fits(&entry) {
            self.submit(builder.take(), seq, sender)?;
        }
        builder.push(entry);
        Ok(())
    }

    /// Write a finalized batch to a job descriptor and enqueue it
    fn submit(&self, batch: Batch, seq: &mut u64, sender: &JobSender) -> Result<()> {
        self.set_phase(ScanPhase::WritingJob);
        let name = format!("{}-{}-{}", JOB_FILE_PREFIX, std::process::id(), *seq);
        let path = self.config.workdir.join(name);

        let file = File::create(&path).map_err(|e| SyncError::DescriptorWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut writer = BufWriter::new(file);
        batch
            .write_descriptor(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|e| SyncError::DescriptorWrite {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        *seq += 1;

        tracing::debug!(
            job = %path.display(),
            entries = batch.len(),
            bytes = batch.total_bytes(),
            "job descriptor written"
        );

        // Blocks while a bounded queue is full: this is the system's
        // backpressure. The timed loop keeps the wait interruptible.
        self.set_phase(ScanPhase::Submitting);
        let mut job = path;
        loop {
            match sender.put_timeout(job, POLL_INTERVAL) {
                Ok(()) => break,
                Err(PutTimeoutError::Timeout(back)) => {
                    if self.interrupted() {
                        return Err(SyncError::Interrupted);
                    }
                    job = back;
                }
                Err(PutTimeoutError::Closed) => return Err(SyncError::QueueClosed),
            }
        }

        self.stats.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        self.set_phase(ScanPhase::Scanning);
        Ok(())
    }

    fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.base_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn skip(&self, path: &Path, reason: &str) {
        self.stats.stat_errors.fetch_add(1, Ordering::Relaxed);
        if self.config.verbose {
            tracing::warn!(path = %path.display(), reason, "skipping entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::DIR_NOMINAL_SIZE;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::thread;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    fn test_config(
        base: &TempDir,
        work: &TempDir,
        sources: &[&str],
        file_cap: usize,
        size_cap: u64,
    ) -> Arc<SyncConfig> {
        Arc::new(SyncConfig {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            destination: "backup:/srv/mirror".into(),
            base_dir: base.path().to_path_buf(),
            worker_count: 1,
            file_cap,
            size_cap_bytes: size_cap,
            queue_capacity: 0,
            workdir: work.path().to_path_buf(),
            rsync_program: "true".into(),
            show_progress: false,
            verbose: false,
        })
    }

    /// Create a file whose stat size is `size` without writing data
    fn sparse_file(path: &Path, size: u64) {
        let file = File::create(path).unwrap();
        file.set_len(size).unwrap();
    }

    /// Run the scanner against a draining consumer and return each job
    /// descriptor's lines, in submission order, plus the final stats.
    fn run_scan(config: Arc<SyncConfig>) -> (Vec<Vec<String>>, Arc<ScanStats>) {
        let queue = JobQueue::new(config.queue_capacity);
        let receiver = queue.receiver();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let batches_clone = Arc::clone(&batches);
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        let drain = thread::spawn(move || loop {
            match receiver.get_timeout(Duration::from_millis(20)) {
                Some(job) => {
                    let text = fs::read_to_string(&job).unwrap();
                    assert!(
                        text.is_empty() || text.ends_with('\n'),
                        "descriptor must be newline-terminated"
                    );
                    let lines: Vec<String> = text.lines().map(String::from).collect();
                    batches_clone.lock().unwrap().push(lines);
                    receiver.task_done();
                }
                None => {
                    if done_clone.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        });

        let scanner = Scanner::new(Arc::clone(&config), Arc::new(AtomicBool::new(false)));
        scanner.run(&queue).unwrap();
        assert_eq!(scanner.phase(), ScanPhase::Completed);

        done.store(true, Ordering::SeqCst);
        drain.join().unwrap();

        let stats = scanner.stats();
        let result = Arc::try_unwrap(batches).unwrap().into_inner().unwrap();
        (result, stats)
    }

    fn union(batches: &[Vec<String>]) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        let mut total = 0usize;
        for batch in batches {
            total += batch.len();
            set.extend(batch.iter().cloned());
        }
        assert_eq!(set.len(), total, "no entry may appear in two batches");
        set
    }

    #[test]
    fn test_size_cap_splits_batches() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let data = base.path().join("data");
        fs::create_dir(&data).unwrap();
        for name in ["f1", "f2", "f3"] {
            sparse_file(&data.join(name), 10 * MB);
        }

        let config = test_config(&base, &work, &["data"], 1000, 25 * MB);
        let (batches, stats) = run_scan(config);

        // Two 10 MB files fit under 25 MB; the third starts a new batch.
        assert_eq!(batches.len(), 2);
        let mut lens: Vec<usize> = batches.iter().map(Vec::len).collect();
        lens.sort_unstable();
        assert_eq!(lens, vec![1, 2]);

        assert_eq!(union(&batches).len(), 3);
        assert_eq!(stats.files_added.load(Ordering::Relaxed), 3);
        assert_eq!(stats.bytes_added.load(Ordering::Relaxed), 30 * MB);
        assert_eq!(stats.jobs_submitted.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_oversized_file_forms_singleton_batch() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let data = base.path().join("data");
        fs::create_dir(&data).unwrap();
        sparse_file(&data.join("small-a"), 1 * MB);
        sparse_file(&data.join("huge"), 500 * MB);
        sparse_file(&data.join("small-b"), 1 * MB);

        let config = test_config(&base, &work, &["data"], 1000, 100 * MB);
        let (batches, stats) = run_scan(config);

        let huge_path = format!("data{}huge", std::path::MAIN_SEPARATOR);
        let singleton = batches
            .iter()
            .find(|b| b.contains(&huge_path))
            .expect("oversized file must be batched");
        assert_eq!(singleton.len(), 1, "oversized entry must travel alone");

        assert_eq!(union(&batches).len(), 3);
        assert_eq!(stats.files_added.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_empty_directory_synthesized() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        fs::create_dir(base.path().join("emptyroot")).unwrap();

        let config = test_config(&base, &work, &["emptyroot"], 1000, 1024 * MB);
        let (batches, stats) = run_scan(config);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["emptyroot".to_string()]);
        assert_eq!(stats.dirs_synthesized.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_added.load(Ordering::Relaxed), DIR_NOMINAL_SIZE);

        // The descriptor itself stays in the scratch dir with the
        // pid+sequence naming scheme until a worker deletes it.
        let names: Vec<String> = fs::read_dir(work.path())
            .unwrap()
            .map(|d| d.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(&format!("{}-{}-", JOB_FILE_PREFIX, std::process::id())));
    }

    #[test]
    fn test_count_cap_splits_batches() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let data = base.path().join("data");
        fs::create_dir(&data).unwrap();
        for name in ["f1", "f2", "f3"] {
            fs::write(data.join(name), b"x").unwrap();
        }

        let config = test_config(&base, &work, &["data"], 2, 1024 * 1024 * MB);
        let (batches, _stats) = run_scan(config);

        // Split purely on count: {two files} then {one file}.
        assert_eq!(batches.len(), 2);
        let mut lens: Vec<usize> = batches.iter().map(Vec::len).collect();
        lens.sort_unstable();
        assert_eq!(lens, vec![1, 2]);
    }

    #[test]
    fn test_nested_tree_no_loss_no_duplication() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let root = base.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("a/empty")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
        fs::write(root.join("a/one.txt"), b"one").unwrap();
        fs::write(root.join("a/b/two.txt"), b"two").unwrap();
        fs::write(root.join("c/three.txt"), b"three").unwrap();

        let config = test_config(&base, &work, &["tree"], 3, 1024 * MB);
        let (batches, stats) = run_scan(config);

        let sep = std::path::MAIN_SEPARATOR;
        let expected: BTreeSet<String> = [
            "tree{s}top.txt",
            "tree{s}a{s}one.txt",
            "tree{s}a{s}b{s}two.txt",
            "tree{s}a{s}empty",
            "tree{s}c{s}three.txt",
        ]
        .iter()
        .map(|p| p.replace("{s}", &sep.to_string()))
        .collect();

        assert_eq!(union(&batches), expected);
        assert_eq!(stats.files_added.load(Ordering::Relaxed), 5);
        assert_eq!(stats.dirs_synthesized.load(Ordering::Relaxed), 1);
        for batch in &batches {
            assert!(batch.len() <= 3, "count cap violated");
        }
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let config = test_config(&base, &work, &["does-not-exist"], 1000, 1024 * MB);
        let (batches, stats) = run_scan(config);

        assert!(batches.is_empty());
        assert_eq!(stats.stat_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.files_added.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_file_root_becomes_entry() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        fs::write(base.path().join("lone.bin"), b"payload").unwrap();

        let config = test_config(&base, &work, &["lone.bin"], 1000, 1024 * MB);
        let (batches, stats) = run_scan(config);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["lone.bin".to_string()]);
        assert_eq!(stats.bytes_added.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_interrupt_aborts_scan() {
        let base = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let data = base.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("f"), b"x").unwrap();

        let config = test_config(&base, &work, &["data"], 1000, 1024 * MB);
        let shutdown = Arc::new(AtomicBool::new(true));
        let scanner = Scanner::new(config, shutdown);
        let queue = JobQueue::new(0);

        assert!(matches!(
            scanner.run(&queue),
            Err(SyncError::Interrupted)
        ));
    }
}
