//! Progress reporting for the transfer pipeline
//!
//! Provides a real-time status line using indicatif, fed by the
//! pipeline's snapshot callback, plus the start/end console output.

use crate::config::SyncConfig;
use crate::pipeline::{PipelineProgress, SyncStats};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays pipeline status
#[derive(Clone)]
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display from a pipeline snapshot
    pub fn update(&self, progress: &PipelineProgress) {
        let bytes_str = format_size(progress.bytes_added, BINARY);
        let strip: String = progress.worker_states.iter().map(|s| s.glyph()).collect();

        let msg = format!(
            "{} | Files: {} | Size: {} | Jobs: {}/{} | Queue: {} | Workers: [{}]",
            progress.phase,
            format_number(progress.files_added),
            bytes_str,
            format_number(progress.jobs_completed),
            format_number(progress.jobs_submitted),
            progress.queue_len,
            strip,
        );

        self.bar.set_message(msg);
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the completed run
pub fn print_summary(stats: &SyncStats) {
    let bytes_str = format_size(stats.bytes_added, BINARY);
    let duration_secs = stats.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.files_added as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Sync Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Files:").bold(),
        format_number(stats.files_added)
    );
    println!("  {} {}", style("Total Size:").bold(), bytes_str);
    println!(
        "  {} {} submitted, {} completed",
        style("Jobs:").bold(),
        format_number(stats.jobs_submitted),
        format_number(stats.jobs_completed)
    );
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.transfer_failures > 0 {
        println!(
            "  {} {} (see per-job logs in the scratch directory)",
            style("Failed transfers:").yellow().bold(),
            format_number(stats.transfer_failures)
        );
    }
    if stats.stat_errors > 0 {
        println!(
            "  {} {}",
            style("Skipped entries:").yellow().bold(),
            format_number(stats.stat_errors)
        );
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(config: &SyncConfig) {
    println!();
    println!(
        "{} {}",
        style("parsync").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} path(s) under {}",
        style("Sources:").bold(),
        config.sources.len(),
        config.base_dir.display()
    );
    println!(
        "  {} {}",
        style("Destination:").bold(),
        config.destination
    );
    println!("  {} {}", style("Workers:").bold(), config.worker_count);
    println!(
        "  {} {} files / {} per job",
        style("Caps:").bold(),
        format_number(config.file_cap as u64),
        format_size(config.size_cap_bytes, BINARY)
    );
    println!();
}
