//! parsync - Parallel rsync Driver
//!
//! Entry point for the CLI application.

use anyhow::Context;
use clap::Parser;
use console::style;
use parsync::config::{CliArgs, SyncConfig};
use parsync::error::SyncError;
use parsync::pipeline::{self, PipelineProgress, SyncStats};
use parsync::progress::{print_header, print_summary, ProgressReporter};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit status for configuration/validation failures
const EXIT_USAGE: u8 = 2;

/// Exit status when the run is interrupted by a signal
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose);

    // Validate and create config; validation problems are usage errors
    let config = match SyncConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(
                e.downcast_ref::<SyncError>(),
                Some(SyncError::Interrupted)
            ) {
                eprintln!("{}", style("Interrupted.").yellow().bold());
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            error!("{:#}", e);
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: SyncConfig) -> anyhow::Result<()> {
    // Setup signal handler for graceful shutdown. The first interrupt
    // raises the flag and lets the pipeline wind down; the second one
    // exits immediately.
    let shutdown = Arc::new(AtomicBool::new(false));
    let interrupts = Arc::new(AtomicUsize::new(0));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            if interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
                eprintln!("\nInterrupt received, shutting down (press again to force)...");
                shutdown.store(true, Ordering::SeqCst);
            } else {
                eprintln!("\nForce shutdown.");
                std::process::exit(EXIT_INTERRUPTED as i32);
            }
        })
        .context("Failed to set signal handler")?;
    }

    if config.show_progress {
        print_header(&config);
    }

    let show_progress = config.show_progress;
    let stats = run_pipeline(config, shutdown).context("Sync failed")?;

    if show_progress {
        print_summary(&stats);
    }
    Ok(())
}

/// Run the pipeline with or without the live progress line
fn run_pipeline(
    config: SyncConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<SyncStats, SyncError> {
    if config.show_progress {
        let reporter = ProgressReporter::new();
        let callback_reporter = reporter.clone();
        let result = pipeline::run(config, shutdown, move |p: PipelineProgress| {
            callback_reporter.update(&p);
        });
        reporter.finish_and_clear();
        result
    } else {
        pipeline::run(config, shutdown, |_p: PipelineProgress| {})
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parsync=debug,warn")
    } else {
        EnvFilter::new("parsync=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
