//! Batch types for work distribution
//!
//! Batches are the unit of work distribution in parsync: each batch
//! holds the entries handed to a single rsync invocation.

mod types;

pub use types::{
    Batch, BatchBuilder, Entry, DEFAULT_MAX_BYTES_MB, DEFAULT_MAX_FILES, DIR_NOMINAL_SIZE,
};
