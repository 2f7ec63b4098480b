//! Scanner module: the producer side of the pipeline
//!
//! Walks the source roots, packs discovered entries into bounded
//! batches, and submits each finalized batch to the job queue as an
//! on-disk job descriptor.

mod scanner;

pub use scanner::{ScanPhase, ScanStats, Scanner, JOB_FILE_PREFIX};
