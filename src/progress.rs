//! Progress reporting for the binary
//!
//! Provides a live spinner while results are collected and a summary once
//! the launch has been joined.

use crate::scatter::LaunchSummary;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner showing collection status
pub struct ProgressReporter {
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

    /// Update the display with the number of results gathered
    pub fn update(&self, results: u64, workers: usize) {
        self.bar.set_message(format!(
            "Results: {} | Workers: {}",
            format_number(results),
            workers,
        ));
    }

    /// Print a line above the spinner
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
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
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the run
pub fn print_header(dirs: &[String], hosts: usize, workers_per_host: usize, work: &str) {
    println!();
    println!(
        "{} {}",
        style("fleet-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    for dir in dirs {
        println!("  {} {}", style("Directory:").bold(), dir);
    }
    println!(
        "  {} {} host(s) x {} worker(s)",
        style("Fleet:").bold(),
        hosts,
        workers_per_host
    );
    println!("  {} {}", style("Work:").bold(), work);
    println!();
}

/// Print a summary of the finished launch
///
/// `total_bytes` is shown when the work function measured sizes.
pub fn print_summary(summary: &LaunchSummary, total_bytes: Option<u64>) {
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.jobs_processed as f64 / secs
    } else {
        0.0
    };

    println!();
    if summary.is_complete() {
        println!("{}", style("Scatter Complete").green().bold());
    } else {
        println!("{}", style("Scatter Incomplete").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(summary.dirs_walked)
    );
    println!(
        "  {} {}",
        style("Files seen:").bold(),
        format_number(summary.files_seen)
    );
    println!(
        "  {} {} of {} queued",
        style("Processed:").bold(),
        format_number(summary.jobs_processed),
        format_number(summary.jobs_queued)
    );
    println!(
        "  {} {}",
        style("Results:").bold(),
        format_number(summary.results)
    );
    if let Some(bytes) = total_bytes {
        println!("  {} {}", style("Total Size:").bold(), format_size(bytes, BINARY));
    }
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    let errors = summary.work_errors + summary.predicate_errors;
    if errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(errors)
        );
    }
    if summary.non_utf8_paths > 0 {
        println!(
            "  {} {} (path is not valid UTF-8)",
            style("Skipped:").yellow().bold(),
            format_number(summary.non_utf8_paths)
        );
    }
    if summary.unprocessed_jobs() > 0 {
        println!(
            "  {} {} (consumers stopped before the queue drained)",
            style("Dropped:").yellow().bold(),
            format_number(summary.unprocessed_jobs())
        );
    }
    println!();
}
