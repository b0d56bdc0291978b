//! mailscan - Parallel Email Archive Scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use mailscan::config::{CliArgs, ScanConfig};
use mailscan::pipeline::ScanCoordinator;
use mailscan::progress::{print_header, print_summary, ProgressReporter};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose);

    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.source.display().to_string(),
            config.job_count,
            &config.output_path.display().to_string(),
        );
    }

    let coordinator = ScanCoordinator::new(config.clone());

    // Ctrl-C trips the cancellation token; workers stop at message
    // boundaries and the writer commits everything already received
    let cancel = coordinator.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing in-flight work...");
        cancel.cancel();
    })
    .context("Failed to set signal handler")?;

    // Opt-in progress display, fed from read-only tracker snapshots
    let stop_progress = Arc::new(AtomicBool::new(false));
    let progress_thread = if config.show_progress {
        let tracker = coordinator.tracker();
        let stop = Arc::clone(&stop_progress);
        let reporter = ProgressReporter::new();
        Some(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                reporter.update(&tracker.snapshot());
                thread::sleep(Duration::from_millis(150));
            }
            reporter.finish_and_clear();
        }))
    } else {
        None
    };

    let result = coordinator.run();

    stop_progress.store(true, Ordering::Relaxed);
    if let Some(handle) = progress_thread {
        let _ = handle.join();
    }

    let outcome = result.context("Scan failed")?;

    if config.show_progress {
        print_summary(&outcome, &config.output_path.display().to_string());
    } else {
        println!(
            "{} files / {} messages / {} entities processed ({})",
            outcome.files_processed, outcome.messages, outcome.entities, outcome.status
        );
        mailscan::progress::print_failures(&outcome.failures);
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let default_filter = if verbose {
        "mailscan=debug"
    } else {
        "mailscan=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
