//! Progress reporting for the scanner
//!
//! Provides real-time progress display using indicatif progress bars, plus
//! the styled header/summary output around a run. Display is opt-in and
//! purely informational: it renders tracker snapshots and never feeds back
//! into scheduling.

use crate::db::FileFailure;
use crate::pipeline::{ProgressSnapshot, ScanOutcome};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays scan status
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

    /// Update the progress display from a tracker snapshot
    pub fn update(&self, progress: &ProgressSnapshot) {
        let msg = format!(
            "Files: {}/{} | Messages: {} | Entities: {} | Rate: {:.0} msg/s | Workers: {}",
            progress.files_done,
            progress.files_total,
            format_number(progress.messages),
            format_number(progress.entities),
            progress.messages_per_second(),
            progress.active_workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
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
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the scan
pub fn print_header(source: &str, jobs: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("mailscan").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Jobs:").bold(), jobs);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a summary of the scan results
pub fn print_summary(outcome: &ScanOutcome, db_path: &str) {
    let title = if outcome.completed() {
        style("Scan Complete").green().bold()
    } else {
        style("Scan Cancelled").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}/{}",
        style("Files:").bold(),
        format_number(outcome.files_processed),
        format_number(outcome.files_total)
    );
    println!(
        "  {} {}",
        style("Messages:").bold(),
        format_number(outcome.messages)
    );
    if outcome.messages_skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(outcome.messages_skipped)
        );
    }
    println!(
        "  {} {}",
        style("Attachments:").bold(),
        format_number(outcome.attachments)
    );
    println!(
        "  {} {}",
        style("Entities:").bold(),
        format_number(outcome.entities)
    );
    println!(
        "  {} {}",
        style("Data:").bold(),
        format_size(outcome.bytes_processed, BINARY)
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        outcome.duration.as_secs_f64()
    );
    println!("  {} {}", style("Database:").bold(), db_path);
    println!();

    print_failures(&outcome.failures);
}

/// Print the failed-file summary, if any files failed
pub fn print_failures(failures: &[FileFailure]) {
    if failures.is_empty() {
        return;
    }

    println!(
        "{}",
        style(format!("{} file(s) failed:", failures.len()))
            .yellow()
            .bold()
    );
    for failure in failures {
        println!("  {} {}", style(&failure.path).bold(), failure.reason);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
