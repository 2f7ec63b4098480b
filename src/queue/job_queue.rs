//! Bounded FIFO job queue with join semantics
//!
//! The queue carries job-descriptor paths from the scanner to the
//! transfer workers. A bounded queue applies backpressure: `put`
//! blocks while the queue is at capacity, which throttles the scanner
//! (and its descriptor writes) when the workers lag. Capacity 0 means
//! unbounded.
//!
//! Beyond the channel itself the queue tracks unfinished jobs: `put`
//! increments the count, `task_done` decrements it, and `join` blocks
//! until it reaches zero. This is how the pipeline knows the queue has
//! fully drained — in-flight jobs included — rather than being
//! momentarily empty.

use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Outcome of a timed `put` attempt
#[derive(Debug)]
pub enum PutTimeoutError {
    /// The queue stayed full for the whole timeout; the job path is
    /// returned so the caller can retry
    Timeout(PathBuf),
    /// All receivers are gone
    Closed,
}

/// Tracks jobs that have been enqueued but not yet marked done
struct JoinTracker {
    unfinished: Mutex<usize>,
    all_done: Condvar,
}

impl JoinTracker {
    fn new() -> Self {
        Self {
            unfinished: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    fn add_one(&self) {
        let mut count = self.unfinished.lock().expect("join tracker poisoned");
        *count += 1;
    }

    fn remove_one(&self) {
        let mut count = self.unfinished.lock().expect("join tracker poisoned");
        if *count == 0 {
            tracing::warn!("task_done called with no unfinished jobs");
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.all_done.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut count = self.unfinished.lock().expect("join tracker poisoned");
        while *count > 0 {
            count = self.all_done.wait(count).expect("join tracker poisoned");
        }
    }

    /// Wait up to `timeout` for the count to reach zero. Returns true
    /// once drained.
    fn wait_drained_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.unfinished.lock().expect("join tracker poisoned");
        let deadline = std::time::Instant::now() + timeout;
        while *count > 0 {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return false,
            };
            let (guard, _) = self
                .all_done
                .wait_timeout(count, remaining)
                .expect("join tracker poisoned");
            count = guard;
        }
        true
    }
}

/// FIFO queue of job-descriptor paths
pub struct JobQueue {
    sender: Sender<PathBuf>,
    receiver: Receiver<PathBuf>,
    capacity: usize,
    tracker: Arc<JoinTracker>,
}

impl JobQueue {
    /// Create a queue with the given capacity (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = if capacity == 0 {
            unbounded()
        } else {
            bounded(capacity)
        };

        Self {
            sender,
            receiver,
            capacity,
            tracker: Arc::new(JoinTracker::new()),
        }
    }

    /// Get a producer handle
    pub fn sender(&self) -> JobSender {
        JobSender {
            sender: self.sender.clone(),
            tracker: Arc::clone(&self.tracker),
        }
    }

    /// Get a consumer handle (clone one per worker)
    pub fn receiver(&self) -> JobReceiver {
        JobReceiver {
            receiver: self.receiver.clone(),
            tracker: Arc::clone(&self.tracker),
        }
    }

    /// Number of jobs currently queued (not counting in-flight jobs)
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if the queue holds no pending jobs
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Configured capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until every `put` has a matching `task_done`
    pub fn join(&self) {
        self.tracker.wait_drained();
    }

    /// Timed variant of [`join`](Self::join); returns true once the
    /// queue has fully drained
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        self.tracker.wait_drained_timeout(timeout)
    }
}

/// Producer handle for the job queue
#[derive(Clone)]
pub struct JobSender {
    sender: Sender<PathBuf>,
    tracker: Arc<JoinTracker>,
}

impl JobSender {
    /// Enqueue a job, blocking while the queue is at capacity
    pub fn put(&self, job: PathBuf) -> Result<()> {
        self.tracker.add_one();
        match self.sender.send(job) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.tracker.remove_one();
                Err(SyncError::QueueClosed)
            }
        }
    }

    /// Enqueue a job, giving up after `timeout` if the queue stays
    /// full. On timeout the job path is handed back for retry, so a
    /// blocked producer can periodically observe a shutdown flag.
    pub fn put_timeout(
        &self,
        job: PathBuf,
        timeout: Duration,
    ) -> std::result::Result<(), PutTimeoutError> {
        self.tracker.add_one();
        match self.sender.send_timeout(job, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) => {
                self.tracker.remove_one();
                Err(PutTimeoutError::Timeout(job))
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                self.tracker.remove_one();
                Err(PutTimeoutError::Closed)
            }
        }
    }
}

/// Consumer handle for the job queue
#[derive(Clone)]
pub struct JobReceiver {
    receiver: Receiver<PathBuf>,
    tracker: Arc<JoinTracker>,
}

impl JobReceiver {
    /// Dequeue the oldest job, blocking until one is available.
    /// Returns None once the queue is closed and empty.
    pub fn get(&self) -> Option<PathBuf> {
        self.receiver.recv().ok()
    }

    /// Dequeue with a timeout, so the caller can poll a shutdown flag
    pub fn get_timeout(&self, timeout: Duration) -> Option<PathBuf> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Mark one previously dequeued job as fully processed
    pub fn task_done(&self) {
        self.tracker.remove_one();
    }

    /// Number of jobs currently queued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if the queue holds no pending jobs
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new(0);
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.put(PathBuf::from("job-0")).unwrap();
        sender.put(PathBuf::from("job-1")).unwrap();
        sender.put(PathBuf::from("job-2")).unwrap();

        assert_eq!(receiver.get().unwrap(), PathBuf::from("job-0"));
        assert_eq!(receiver.get().unwrap(), PathBuf::from("job-1"));
        assert_eq!(receiver.get().unwrap(), PathBuf::from("job-2"));
    }

    #[test]
    fn test_join_waits_for_in_flight_jobs() {
        let queue = JobQueue::new(0);
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.put(PathBuf::from("a")).unwrap();
        sender.put(PathBuf::from("b")).unwrap();

        // Dequeue both: the queue is empty but nothing is done yet.
        receiver.get().unwrap();
        receiver.get().unwrap();
        assert!(queue.is_empty());
        assert!(!queue.join_timeout(Duration::from_millis(50)));

        receiver.task_done();
        assert!(!queue.join_timeout(Duration::from_millis(50)));

        receiver.task_done();
        assert!(queue.join_timeout(Duration::from_millis(50)));
        queue.join(); // drained: returns immediately
    }

    #[test]
    fn test_bounded_put_applies_backpressure() {
        let queue = JobQueue::new(1);
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.put(PathBuf::from("first")).unwrap();

        // The queue is full: a timed put must hand the job back.
        match sender.put_timeout(PathBuf::from("second"), Duration::from_millis(50)) {
            Err(PutTimeoutError::Timeout(job)) => assert_eq!(job, PathBuf::from("second")),
            other => panic!("expected timeout, got {other:?}"),
        }

        // A blocking put unblocks once a consumer frees the slot.
        let unblocked = Arc::new(AtomicBool::new(false));
        let unblocked_clone = Arc::clone(&unblocked);
        let blocked_sender = queue.sender();
        let handle = thread::spawn(move || {
            blocked_sender.put(PathBuf::from("third")).unwrap();
            unblocked_clone.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!unblocked.load(Ordering::SeqCst));

        assert_eq!(receiver.get().unwrap(), PathBuf::from("first"));
        handle.join().unwrap();
        assert!(unblocked.load(Ordering::SeqCst));
        assert_eq!(receiver.get().unwrap(), PathBuf::from("third"));
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let queue = JobQueue::new(0);
        let sender = queue.sender();
        for i in 0..1000 {
            sender.put(PathBuf::from(format!("job-{i}"))).unwrap();
        }
        assert_eq!(queue.len(), 1000);
    }

    #[test]
    fn test_get_timeout_on_empty_queue() {
        let queue = JobQueue::new(0);
        let receiver = queue.receiver();
        assert!(receiver.get_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_put_after_receivers_dropped() {
        let queue = JobQueue::new(0);
        let sender = queue.sender();
        drop(queue); // drops the only receiver

        assert!(matches!(
            sender.put(PathBuf::from("x")),
            Err(SyncError::QueueClosed)
        ));
        // The failed put must not leave an unfinished job behind.
        assert!(sender.tracker.wait_drained_timeout(Duration::from_millis(10)));
    }
}
