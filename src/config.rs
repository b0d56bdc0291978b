//! Configuration types for mailscan
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//!
//! The pipeline never starts a job on an invalid configuration: all checks
//! happen in [`ScanConfig::from_args`] before anything is dispatched.

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum reasonable job count
const MAX_JOBS: usize = 256;

/// Minimum writer intake queue size
const MIN_QUEUE_SIZE: usize = 16;

/// Parallel email archive scanner with SQLite output
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mailscan",
    version,
    about = "Parallel email archive scanner with SQLite output",
    long_about = "Scans a directory of email containers (mbox or eml), extracts message,\n\
                  attachment and entity facts in parallel, and stores the results in a\n\
                  SQLite database for later analysis.",
    after_help = "EXAMPLES:\n    \
        mailscan ./enron-dump -o enron.db\n    \
        mailscan ./exports -j 8 -p\n    \
        mailscan archive.mbox --report-only -o report.db\n    \
        mailscan ./mail --include-content -o full.db"
)]
pub struct CliArgs {
    /// Source file or directory of mail containers
    #[arg(value_name = "SRC")]
    pub source: PathBuf,

    /// Output SQLite database file
    #[arg(short = 'o', long = "out", default_value = "mailscan.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Number of extraction worker threads
    #[arg(
        short = 'j',
        long,
        default_value_t = default_jobs(),
        value_name = "NUM"
    )]
    pub jobs: usize,

    /// Skip entity recognition (file/message/attachment report only)
    #[arg(long)]
    pub report_only: bool,

    /// Store message bodies and headers in the database
    #[arg(long)]
    pub include_content: bool,

    /// Show a progress indicator
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (show per-message skips and debug detail)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Writer intake queue size (controls memory usage)
    #[arg(long, default_value = "512", value_name = "NUM")]
    pub queue_size: usize,
}

fn default_jobs() -> usize {
    num_cpus::get()
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Source file or directory
    pub source: PathBuf,

    /// Output database path
    pub output_path: PathBuf,

    /// Number of worker threads
    pub job_count: usize,

    /// Run the entity recognizer over message bodies
    pub extract_entities: bool,

    /// Store message bodies and headers
    pub include_message_body: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Writer intake channel capacity
    pub queue_size: usize,
}

impl ScanConfig {
    /// Validate the bounds no run may start with
    ///
    /// Called from [`ScanConfig::from_args`] and again by the coordinator
    /// before dispatch, so a hand-built configuration cannot bypass it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_count == 0 || self.job_count > MAX_JOBS {
            return Err(ConfigError::InvalidJobCount {
                count: self.job_count,
                max: MAX_JOBS,
            });
        }

        if self.queue_size < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: self.queue_size,
                min: MIN_QUEUE_SIZE,
            });
        }

        Ok(())
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // The source must exist up front: a bad root argument is a usage
        // error, not a per-job failure
        if !args.source.exists() {
            return Err(ConfigError::InvalidSourcePath {
                path: args.source.clone(),
                reason: "path does not exist".into(),
            });
        }

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let config = Self {
            source: args.source,
            output_path: args.output,
            job_count: args.jobs,
            extract_entities: !args.report_only,
            include_message_body: args.include_content,
            show_progress: args.progress,
            verbose: args.verbose,
            queue_size: args.queue_size,
        };
        config.validate()?;

        Ok(config)
    }
}
