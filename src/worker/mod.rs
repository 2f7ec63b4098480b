//! Worker module: the consumer side of the pipeline
//!
//! A fixed pool of transfer workers drains the job queue, invoking the
//! external transfer tool once per job descriptor.

mod transfer;

pub use transfer::{
    JobResult, ResultHook, WorkerPool, WorkerState, WorkerStateCell, LOG_SUFFIX, RSYNC_FLAGS,
};
