//! Error types for parsync
//!
//! This module defines the error hierarchy for the batching pipeline:
//! - Configuration and CLI validation errors
//! - Scratch-directory and job-descriptor I/O errors
//! - Queue/worker coordination errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Per-entry filesystem failures during the scan are recoverable:
//!   they are counted and skipped, never surfaced as errors
//! - Fatal paths are limited to configuration problems and scratch
//!   directory I/O

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the parsync pipeline
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (job descriptor writes, scratch directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write a job descriptor file
    #[error("Failed to write job descriptor '{path}': {reason}")]
    DescriptorWrite { path: PathBuf, reason: String },

    /// Job queue closed while the pipeline was still running
    #[error("Job queue closed unexpectedly")]
    QueueClosed,

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,

    /// A pipeline thread panicked
    #[error("Pipeline thread '{name}' panicked")]
    ThreadPanicked { name: &'static str },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid file-count cap
    #[error("Invalid file-count cap {cap}: must be at least 1")]
    InvalidFileCap { cap: usize },

    /// Invalid size cap
    #[error("Invalid size cap {mb} MB: must be at least 1")]
    InvalidSizeCap { mb: u64 },

    /// No destination argument
    #[error("Missing destination: the last positional argument is the rsync destination")]
    MissingDestination,

    /// Source set resolved to nothing
    #[error("No source paths: specify positional sources or a non-empty --files-from file")]
    NoSources,

    /// A --files-from file could not be read
    #[error("Failed to read source list '{path}': {reason}")]
    SourceFileRead { path: PathBuf, reason: String },

    /// Home directory could not be determined for the scratch dir
    #[error("Cannot determine home directory for the scratch directory")]
    NoHomeDir,

    /// Scratch directory could not be created
    #[error("Failed to create scratch directory '{path}': {reason}")]
    WorkdirCreateFailed { path: PathBuf, reason: String },
}

/// Result type alias for SyncError
pub type Result<T> = std::result::Result<T, SyncError>;
