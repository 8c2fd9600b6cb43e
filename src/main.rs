//! Biosensor DAQ CLI
//!
//! Headless acquisition front end: live readout, periodic marks and a
//! whole-run report on exit.

use biosensor_daq::{
    Acquisition, Config, LineSource, ReaderSource, RunReport, SessionReader, TransportError,
    PROTOCOL_REFERENCE, VERSION,
};
use clap::{Parser, Subcommand};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the main loop checks for stop conditions.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Live readout cadence.
const READOUT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "biosensor-daq")]
#[command(version = VERSION)]
#[command(about = "ECG/EDR biosensor acquisition", long_about = None)]
struct Cli {
    /// Log every dropped line and fallback read
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire from the serial port or replay a capture
    Run {
        /// Capture file to replay instead of the serial port ("-" for stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long, short)]
        duration: Option<u64>,

        /// Record a mark every N seconds
        #[arg(long)]
        mark_every: Option<u64>,

        /// Skip writing the run report
        #[arg(long)]
        no_export: bool,
    },

    /// Summarize a saved run report
    Report {
        /// Path to a run_*.json file
        path: PathBuf,
    },

    /// Show the wire protocol tags
    Protocol,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = load_config();
    init_logging(cli.verbose || config.verbose);

    match cli.command {
        Commands::Run {
            input,
            duration,
            mark_every,
            no_export,
        } => {
            cmd_run(
                &config,
                input.as_deref(),
                duration.map(Duration::from_secs),
                mark_every.filter(|&s| s > 0).map(Duration::from_secs),
                no_export,
            );
        }
        Commands::Report { path } => {
            cmd_report(&path);
        }
        Commands::Protocol => {
            println!("{PROTOCOL_REFERENCE}");
        }
        Commands::Config { save } => {
            cmd_config(&config, save);
        }
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    })
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("biosensor_daq=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "biosensor_daq=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_run(
    config: &Config,
    input: Option<&Path>,
    duration: Option<Duration>,
    mark_every: Option<Duration>,
    no_export: bool,
) {
    println!("Biosensor DAQ v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let source = match open_source(config, input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error opening input: {e}");
            std::process::exit(1);
        }
    };

    println!("Starting acquisition...");
    println!("  Seconds per count: {}", config.seconds_per_count);
    println!("  Drawable window: {}s", config.drawable_seconds());
    if let Some(limit) = duration {
        println!("  Duration: {}s", limit.as_secs());
    }
    if let Some(interval) = mark_every {
        println!("  Mark every: {}s", interval.as_secs());
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut acquisition = Acquisition::new(config.engine());
    match acquisition.start(source) {
        Ok(run_id) => println!("Run ID: {run_id}"),
        Err(e) => {
            eprintln!("Error starting acquisition: {e}");
            std::process::exit(1);
        }
    }

    let reader = acquisition.reader();
    let started = Instant::now();
    let mut last_readout = Instant::now();
    let mut last_mark = Instant::now();

    while running.load(Ordering::SeqCst) && acquisition.is_running() {
        thread::sleep(POLL_INTERVAL);

        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }

        if let Some(interval) = mark_every {
            if last_mark.elapsed() >= interval {
                match acquisition.add_mark() {
                    Ok(mark) => println!("Mark {} at {:.2}s", mark.number, mark.time_secs),
                    Err(e) => eprintln!("Could not record mark: {e}"),
                }
                last_mark = Instant::now();
            }
        }

        if last_readout.elapsed() >= READOUT_INTERVAL {
            print_readout(&reader);
            last_readout = Instant::now();
        }
    }

    // Stop acquisition
    println!();
    println!("Stopping acquisition...");
    let report = match acquisition.stop() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error stopping acquisition: {e}");
            std::process::exit(1);
        }
    };

    // Final stats
    println!();
    println!("{}", report.stats.summary());
    println!();
    println!("{}", report.summary());

    if no_export {
        return;
    }
    match report.write_to(&config.export_path) {
        Ok(path) => println!("Exported run report to {path:?}"),
        Err(e) => eprintln!("Error writing run report: {e}"),
    }
}

/// Pick the transport: a capture file, stdin, or the configured serial port.
fn open_source(
    config: &Config,
    input: Option<&Path>,
) -> Result<Box<dyn LineSource + Send>, TransportError> {
    match input {
        Some(path) if path == Path::new("-") => {
            Ok(Box::new(ReaderSource::new(BufReader::new(std::io::stdin()))))
        }
        Some(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| TransportError::Open(format!("{}: {e}", path.display())))?;
            Ok(Box::new(ReaderSource::new(BufReader::new(file))))
        }
        None => open_serial(config),
    }
}

#[cfg(feature = "serial")]
fn open_serial(config: &Config) -> Result<Box<dyn LineSource + Send>, TransportError> {
    let source =
        biosensor_daq::SerialSource::open(&config.port, config.baud_rate, config.read_timeout)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "serial"))]
fn open_serial(config: &Config) -> Result<Box<dyn LineSource + Send>, TransportError> {
    Err(TransportError::Open(format!(
        "{}: serial support not enabled at compile time (rebuild with --features serial, or pass --input)",
        config.port
    )))
}

/// One line of live readout, read under a snapshot so the values agree.
fn print_readout(reader: &SessionReader) {
    let snapshot = reader.acquire_snapshot();
    if snapshot.window().is_none() {
        println!("  waiting for samples...");
        return;
    }

    let time = snapshot.get_last("time");
    let bpm = snapshot.get_last("bpm_secondary");
    let edr = snapshot.get_last("edr");
    let beats = snapshot.beats_in_window().len();
    snapshot.release();

    let pulse = if !reader.pulse_found() {
        "searching"
    } else if reader.pulse_regular() {
        "regular"
    } else {
        "irregular"
    };

    println!("  t={time:>8.2}s  BPM {bpm:>6.1}  EDR {edr:>6.0}  beats {beats:>3}  pulse {pulse}");
}

fn cmd_report(path: &Path) {
    match RunReport::load(path) {
        Ok(report) => {
            println!("{}", report.summary());
            println!();
            println!("Channels:");
            for (channel, summary) in &report.channels {
                let (min, max) = summary.limits;
                let mean = summary
                    .mean
                    .map(|m| format!("{m:.2}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {channel:<16} n={:<8} range=[{min:.1}, {max:.1}] mean={mean}",
                    summary.count
                );
            }
        }
        Err(e) => {
            eprintln!("Error reading report: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config(config: &Config, save: bool) {
    if save {
        match config.save() {
            Ok(()) => println!("Saved configuration to {:?}", Config::config_path()),
            Err(e) => {
                eprintln!("Error saving config: {e}");
                std::process::exit(1);
            }
        }
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
