use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use burnin::io_utils::{burnin_cli_error, io_cli_error, simple_cli_error};
use burnin::{BurnInTester, GlobDiscovery, HistoryRecord, HistoryStore, RunConfig, TestConfig};
use clap::{Args, Parser, Subcommand};
use indicatif::MultiProgress;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Destructive burn-in testing for block devices.
#[derive(Parser)]
#[command(name = "burnin")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Watch for devices and burn each one in exactly once
    Run(RunArgs),
    /// Print the recorded test history
    History(HistoryArgs),
}

#[derive(Args)]
struct RunArgs {
    /// File that maintains the history of tested devices
    #[arg(long, default_value = "history.db")]
    db: PathBuf,
    /// Base directory to look for new devices
    #[arg(long, default_value = "/dev/disk/by-id/")]
    root: PathBuf,
    /// Glob filter, relative to root, limiting which devices are tested
    #[arg(long, default_value = "")]
    filter: String,
    /// Target write size in GB per device (half contiguous, half random)
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    write_size: i64,
    /// Number of devices tested concurrently
    #[arg(long, default_value_t = 64)]
    workers: usize,
    /// Capacity of the dispatch queue
    #[arg(long, default_value_t = 1024)]
    queue_depth: usize,
    /// Seconds between discovery passes
    #[arg(long, default_value_t = 2)]
    interval_secs: u64,
    /// Disable per-device progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// History file to read
    #[arg(long, default_value = "history.db")]
    db: PathBuf,
    /// Print records as a JSON array
    #[arg(long)]
    json: bool,
    /// Write records as CSV to this path
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Run(args) => run_devices(args),
        Command::History(args) => show_history(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_devices(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let test = TestConfig::from_gigabytes(args.write_size)
        .map_err(|e| burnin_cli_error("invalid write size", e))?;
    let config = RunConfig {
        db: args.db,
        root: args.root,
        filter: args.filter,
        workers: args.workers,
        queue_depth: args.queue_depth,
        interval: Duration::from_secs(args.interval_secs),
        test,
    };
    config
        .validate()
        .map_err(|e| burnin_cli_error("invalid configuration", e))?;
    let discovery = GlobDiscovery::new(config.pattern())
        .map_err(|e| burnin_cli_error("invalid configuration", e))?;

    let store = HistoryStore::load(&config.db).map_err(|e| burnin_cli_error("loading history", e))?;
    let store = Arc::new(store);
    info!(
        db = %store.path().display(),
        records = store.len(),
        pattern = discovery.pattern(),
        "history loaded"
    );

    let mut tester = BurnInTester::new(config.test.clone());
    if !args.no_progress {
        tester = tester.with_progress(MultiProgress::new());
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let outcome = burnin::run(&config, discovery, Arc::clone(&store), Arc::new(tester), &stop_rx);
    store
        .close()
        .map_err(|e| burnin_cli_error("closing history", e))?;
    let summary = outcome.map_err(|e| burnin_cli_error("burn-in stopped", e))?;
    info!(
        passed = summary.workers.passed,
        failed = summary.workers.failed,
        corrupted = summary.workers.corrupted,
        unrecorded = summary.workers.unrecorded,
        "burn-in finished"
    );
    Ok(())
}

fn show_history(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.db.exists() {
        let msg = format!("history file {} does not exist", args.db.display());
        return Err(simple_cli_error(&msg).into());
    }
    let store = HistoryStore::load(&args.db).map_err(|e| burnin_cli_error("loading history", e))?;
    let records = store.records();
    store.close()?;

    if let Some(path) = &args.csv {
        let f = File::create(path).map_err(|e| io_cli_error("creating csv", path, e))?;
        let mut wtr = csv::Writer::from_writer(f);
        wtr.write_record([
            "path",
            "timestamp",
            "size",
            "elapsed_secs",
            "written",
            "read",
            "contiguous_write",
            "contiguous_read",
            "random_write",
            "random_read",
        ])?;
        for r in &records {
            wtr.write_record([
                r.path.clone(),
                unix_secs(r).to_string(),
                r.results.size.to_string(),
                format!("{:.3}", r.results.elapsed.as_secs_f64()),
                r.results.written.to_string(),
                r.results.read.to_string(),
                r.results.contiguous_write.rate.clone(),
                r.results.contiguous_read.rate.clone(),
                r.results.random_write.rate.clone(),
                r.results.random_read.rate.clone(),
            ])?;
        }
        wtr.flush()?;
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &records)?;
        out.write_all(b"\n")?;
        return Ok(());
    }
    for r in &records {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.2?}\tcw {}\tcr {}\trw {}\trr {}",
            r.path,
            unix_secs(r),
            r.results.human_size,
            r.results.elapsed,
            r.results.contiguous_write.rate,
            r.results.contiguous_read.rate,
            r.results.random_write.rate,
            r.results.random_read.rate,
        )?;
    }
    writeln!(out, "#records: {}", records.len())?;
    Ok(())
}

fn unix_secs(record: &HistoryRecord) -> u64 {
    record
        .ts
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
