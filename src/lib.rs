//! parsync - Parallel rsync Driver
//!
//! A tool for pushing large filesystem trees through rsync in parallel.
//! A single scanner walks the source roots and splits the discovered
//! files into bounded batches; a fixed pool of workers runs one rsync
//! invocation per batch, so many transfers proceed at once instead of
//! one rsync crawling the whole tree.
//!
//! # Features
//!
//! - **Bounded Batches**: Each rsync invocation gets at most N files
//!   and at most M bytes, keeping individual transfers short and
//!   restartable.
//!
//! - **On-Disk Job Descriptors**: Every batch is written to a
//!   `--files-from` descriptor in a scratch directory before it is
//!   queued, so the paths handed to rsync are always inspectable.
//!
//! - **Backpressure**: An optional bound on the job queue stops the
//!   scanner from racing ahead of the workers on huge trees.
//!
//! - **Per-Job Logs**: Each invocation writes its own rsync log file
//!   next to the descriptor, so a failed batch can be audited and
//!   replayed in isolation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Source Roots                               │
//! │              (paths relative to the base dir)                    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               │ depth-first walk
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Scanner Thread                            │
//! │            entries → BatchBuilder (count/size caps)              │
//! │                         │                                        │
//! │                         ▼                                        │
//! │            job descriptor files (~/.parsync/parsync-PID-SEQ)     │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!               ┌──────────────────────────┐
//!               │        Job Queue         │
//!               │   (crossbeam bounded)    │
//!               │  - backpressure support  │
//!               │  - join/task_done        │
//!               └────────────┬─────────────┘
//!                            │
//!          ┌─────────────┬───┴─────────┬─────────────┐
//!          ▼             ▼             ▼             ▼
//!     ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌─────────┐
//!     │Worker 1 │   │Worker 2 │   │Worker 3 │...│Worker N │
//!     │  rsync  │   │  rsync  │   │  rsync  │   │  rsync  │
//!     └─────────┘   └─────────┘   └─────────┘   └─────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Mirror two trees with 8 parallel transfers
//! parsync -b /srv/data -w 8 projects archives backup:/srv/mirror
//!
//! # Cap each job at 5000 files / 512 MB and bound the queue
//! parsync -b / -f 5000 -s 512 -q 64 home/alice backup:/srv/mirror
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod scan;
pub mod worker;

pub use config::{CliArgs, SyncConfig};
pub use error::{ConfigError, Result, SyncError};
pub use pipeline::{PipelineProgress, SyncStats};
