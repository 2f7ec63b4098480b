//! Job queue between the scanner and the transfer workers
//!
//! A FIFO of job-descriptor paths with bounded capacity (backpressure)
//! and join semantics: the scanner can wait until every enqueued job
//! has been fully processed, not merely dequeued.

mod job_queue;

pub use job_queue::{JobQueue, JobReceiver, JobSender, PutTimeoutError};
