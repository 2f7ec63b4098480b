//! Configuration types for parsync
//!
//! Defines the CLI surface and the validated runtime configuration.
//! All validation happens in [`SyncConfig::from_args`] before any
//! thread is started; validation failures exit with status 2.

use crate::batch::{DEFAULT_MAX_BYTES_MB, DEFAULT_MAX_FILES};
use crate::error::ConfigError;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Default number of rsync workers
pub const DEFAULT_WORKERS: usize = 4;

/// Name of the per-user scratch directory under $HOME
pub const WORKDIR_NAME: &str = ".parsync";

/// Parallel rsync driver for large file-tree synchronizations
#[derive(Parser, Debug, Clone)]
#[command(
    name = "parsync",
    version,
    about = "Parallel rsync driver for large file-tree synchronizations",
    long_about = "Splits a large set of source paths into count- and size-bounded \
                  batches and feeds them to a pool of concurrent rsync workers.\n\n\
                  Each batch becomes one rsync invocation driven by a --files-from \
                  job file; a bounded job queue applies backpressure between the \
                  scanner and the workers.",
    after_help = "EXAMPLES:\n    \
        # Sync two trees with 8 workers, 512 MB / 5000 files per batch\n    \
        parsync -b /data -w 8 -s 512 -f 5000 projects archives backup:/data\n\n    \
        # Sources from a file, bounded to 10 queued jobs ahead of the workers\n    \
        parsync -b / --files-from sources.txt -q 10 user@backup:/srv/mirror"
)]
pub struct CliArgs {
    /// Source paths (relative to the base directory); the last
    /// positional argument is the rsync destination
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Base directory the source paths are relative to
    #[arg(short = 'b', long, default_value = "/", value_name = "DIR")]
    pub base_dir: PathBuf,

    /// File of source paths, one per line (can be repeated)
    #[arg(long = "files-from", value_name = "FILE", action = clap::ArgAction::Append)]
    pub files_from: Vec<PathBuf>,

    /// Number of concurrent rsync workers
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS, value_name = "NUM")]
    pub workers: usize,

    /// Submit a batch to a worker once it reaches this size in megabytes
    #[arg(short = 's', long, default_value_t = DEFAULT_MAX_BYTES_MB, value_name = "MB")]
    pub size: u64,

    /// Submit a batch to a worker once it holds this many files
    #[arg(short = 'f', long = "file-number", default_value_t = DEFAULT_MAX_FILES, value_name = "NUM")]
    pub file_number: usize,

    /// Only write this many job files ahead of the workers (0 = unbounded)
    #[arg(short = 'q', long = "queue", default_value_t = 0, value_name = "NUM")]
    pub queue_size: usize,

    /// Suppress the progress line
    #[arg(long)]
    pub quiet: bool,

    /// Verbose output (log skipped entries)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration for the pipeline
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source paths relative to the base directory
    pub sources: Vec<String>,
    /// rsync destination ([user@]host:path or a local path)
    pub destination: String,
    /// Base directory the sources are relative to
    pub base_dir: PathBuf,
    /// Number of transfer workers
    pub worker_count: usize,
    /// Maximum files per batch
    pub file_cap: usize,
    /// Maximum bytes per batch
    pub size_cap_bytes: u64,
    /// Job queue capacity (0 = unbounded)
    pub queue_capacity: usize,
    /// Scratch directory for job descriptors and per-job logs
    pub workdir: PathBuf,
    /// Program invoked for each batch (overridable for tests)
    pub rsync_program: String,
    /// Show the progress line
    pub show_progress: bool,
    /// Verbose logging
    pub verbose: bool,
}

impl SyncConfig {
    /// Build and validate a configuration from parsed CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }
        if args.file_number == 0 {
            return Err(ConfigError::InvalidFileCap {
                cap: args.file_number,
            });
        }
        if args.size == 0 {
            return Err(ConfigError::InvalidSizeCap { mb: args.size });
        }

        // The last positional is the destination; everything before it
        // plus the contents of --files-from files is the source set.
        let (destination, positional_sources) = match args.paths.split_last() {
            Some((dest, rest)) => (dest.clone(), rest.to_vec()),
            None => return Err(ConfigError::MissingDestination),
        };

        let mut sources = positional_sources;
        for list in &args.files_from {
            let text = fs::read_to_string(list).map_err(|e| ConfigError::SourceFileRead {
                path: list.clone(),
                reason: e.to_string(),
            })?;
            sources.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            );
        }

        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let workdir = dirs::home_dir()
            .ok_or(ConfigError::NoHomeDir)?
            .join(WORKDIR_NAME);

        Ok(Self {
            sources,
            destination,
            base_dir: args.base_dir.clone(),
            worker_count: args.workers,
            file_cap: args.file_number,
            size_cap_bytes: args.size * 1024 * 1024,
            queue_capacity: args.queue_size,
            workdir,
            rsync_program: "rsync".to_string(),
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Create the scratch directory if it does not exist
    pub fn ensure_workdir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.workdir).map_err(|e| ConfigError::WorkdirCreateFailed {
            path: self.workdir.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).expect("args should parse")
    }

    #[test]
    fn test_sources_and_destination_split() {
        let args = parse(&["parsync", "-b", "/data", "proj", "docs", "host:/backup"]);
        let config = SyncConfig::from_args(&args).unwrap();
        assert_eq!(config.sources, vec!["proj", "docs"]);
        assert_eq!(config.destination, "host:/backup");
        assert_eq!(config.base_dir, PathBuf::from("/data"));
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["parsync", "src", "dest"]);
        let config = SyncConfig::from_args(&args).unwrap();
        assert_eq!(config.worker_count, DEFAULT_WORKERS);
        assert_eq!(config.file_cap, DEFAULT_MAX_FILES);
        assert_eq!(config.size_cap_bytes, DEFAULT_MAX_BYTES_MB * 1024 * 1024);
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.rsync_program, "rsync");
    }

    #[test]
    fn test_rejects_zero_workers() {
        let args = parse(&["parsync", "-w", "0", "src", "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_caps() {
        let args = parse(&["parsync", "-f", "0", "src", "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::InvalidFileCap { .. })
        ));

        let args = parse(&["parsync", "-s", "0", "src", "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::InvalidSizeCap { .. })
        ));
    }

    #[test]
    fn test_destination_alone_needs_files_from() {
        // A single positional is the destination; with no --files-from
        // there are no sources left.
        let args = parse(&["parsync", "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::NoSources)
        ));
    }

    #[test]
    fn test_files_from_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("sources.txt");
        fs::write(&list, "alpha\n\n  beta  \n").unwrap();

        let list_arg = list.to_str().unwrap();
        let args = parse(&["parsync", "--files-from", list_arg, "dest"]);
        let config = SyncConfig::from_args(&args).unwrap();
        assert_eq!(config.sources, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_files_from_missing_file() {
        let args = parse(&["parsync", "--files-from", "/no/such/list", "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::SourceFileRead { .. })
        ));
    }

    #[test]
    fn test_empty_files_from_is_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("empty.txt");
        fs::write(&list, "\n\n").unwrap();

        let list_arg = list.to_str().unwrap();
        let args = parse(&["parsync", "--files-from", list_arg, "dest"]);
        assert!(matches!(
            SyncConfig::from_args(&args),
            Err(ConfigError::NoSources)
        ));
    }
}
