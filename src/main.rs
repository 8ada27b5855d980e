//! fleet-walker - scatter a file walk over a fleet of workers
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use fleet_walker::builtin::WorkKind;
use fleet_walker::config::{CliArgs, ScatterConfig};
use fleet_walker::progress::{print_header, print_summary, ProgressReporter};
use fleet_walker::{Launcher, ResultTuple};
use std::process::ExitCode;
use tracing::{error, info, warn};
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
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ScatterConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        let dirs: Vec<String> = config
            .top_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        print_header(&dirs, config.hosts, config.workers_per_host, config.work.name());
    }

    let launcher = Launcher::new(config.topology(), config.launch.clone());
    let work = config.work;
    let launch = launcher
        .launch_with(
            move |path: &str| work.run(path),
            config.filter.clone().into_predicate(),
            &config.top_dirs,
        )
        .context("Failed to launch workers")?;

    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Walking...");
    }

    let workers = launch.expected_completions();
    let mut handled = 0u64;
    let mut total = 0u64;
    let handler = |tuple: ResultTuple<u64>| {
        handled += 1;
        total += tuple.value.unwrap_or(0);

        let line = if config.json {
            match serde_json::to_string(&tuple) {
                Ok(line) => line,
                Err(e) => {
                    warn!(path = %tuple.path, error = %e, "Failed to encode result");
                    return;
                }
            }
        } else {
            format!("{}\t{}", tuple.value.unwrap_or(0), tuple.path)
        };

        match progress {
            Some(ref p) => {
                p.println(line);
                p.update(handled, workers);
            }
            None => println!("{}", line),
        }
    };

    let collected = match config.timeout {
        Some(timeout) => launch.collect_timeout(handler, timeout),
        None => launch.collect(handler),
    };

    if let Some(ref p) = progress {
        p.finish_and_clear();
    }

    let stats = collected.context("Result collection failed")?;
    info!(results = stats.results, workers = stats.completions, "Collection finished");

    let summary = launch.join().context("Worker thread failed")?;

    if config.show_progress {
        let total_bytes = (config.work == WorkKind::Size).then_some(total);
        print_summary(&summary, total_bytes);
    }

    if !summary.is_complete() {
        warn!(
            unprocessed = summary.unprocessed_jobs(),
            "Some queued files were never processed"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("fleet_walker=debug,warn")
    } else {
        EnvFilter::new("fleet_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
