use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use forecast_archiver::{
    build_client, Archiver, ArchiverConfig, Backoff, CancelToken, FetchConfig, RunReport,
    TargetTable, DEFAULT_ROOT,
};

/// Download forecast panel images, keeping a canonical copy and a timestamped archive copy per site
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory for saved images
    #[arg(long, default_value = DEFAULT_ROOT)]
    target_root: PathBuf,

    /// Comma-separated list of sites to download (default: all sites)
    #[arg(long, value_delimiter = ',')]
    sites: Option<Vec<String>>,

    /// JSON site table to use instead of the built-in CW3E West-WRF snow panels
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Per-attempt request timeout in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Total attempts per site
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,

    /// Backoff base: the wait after failed attempt n is base^(n-1) seconds
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(2..))]
    backoff_base: u32,

    /// Upper bound on a single backoff wait, in seconds
    #[arg(long)]
    max_delay: Option<u64>,

    /// Number of sites downloaded concurrently (1 to 64)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=64))]
    jobs: u64,

    /// Stop starting new downloads after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// List the configured sites and exit
    #[arg(long)]
    list_sites: bool,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(report) if !report.has_failures() => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("Download failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    let table = match &cli.targets {
        Some(path) => TargetTable::from_json_file(path)?,
        None => TargetTable::default(),
    };

    if cli.list_sites {
        for target in table.targets() {
            println!("  {:15} {}", target.name, target.source_url);
        }
        return Ok(RunReport::default());
    }

    let targets = table.select(cli.sites.as_deref())?;

    let config = ArchiverConfig {
        root_dir: cli.target_root.clone(),
        jobs: cli.jobs as usize,
        fetch: FetchConfig {
            timeout: Duration::from_secs(cli.timeout),
            max_attempts: cli.retries,
            backoff: Backoff {
                base: cli.backoff_base,
                unit: Duration::from_secs(1),
                max_delay: cli.max_delay.map(Duration::from_secs),
            },
            ..FetchConfig::default()
        },
    };

    let cancel = match cli.deadline {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, finishing in-flight downloads");
        on_interrupt.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let client = build_client().context("Failed to build HTTP client")?;
    info!("Starting image download for {} sites", targets.len());
    let report = Archiver::new(&client, config)
        .with_cancel(cancel)
        .run(&targets)?;

    print_report(&report);

    if let Some(path) = &cli.report {
        let json = report.to_json().context("Failed to serialize run report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        info!("Run report saved to {}", path.display());
    }

    if report.degraded > 0 {
        warn!("{} site(s) saved without an archive copy", report.degraded);
    }

    Ok(report)
}

fn print_report(report: &RunReport) {
    println!("\n{}", "=".repeat(60));
    println!("Download Results:");
    println!("{}", "=".repeat(60));
    for outcome in &report.outcomes {
        println!(
            "  {:15} {:20} -> {}",
            outcome.name(),
            outcome.status.to_string(),
            outcome.canonical_path.display()
        );
        let detail = outcome.detail();
        if !detail.is_empty() {
            println!("  {:15} {}", "", detail);
        }
    }
    println!("{}", "=".repeat(60));
    println!(
        "\n{} succeeded, {} without archive copy, {} failed",
        report.succeeded, report.degraded, report.failed
    );
}
