// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stint Daemon (stintd)
//!
//! Background process that owns the learner ledger: serves start/stop
//! requests from worker jobs over the configured endpoint and
//! periodically reconciles claims against the cluster queue.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};

use stint_adapters::{PbsAdapter, SchedulerAdapter, SlurmAdapter};
use stint_daemon::{Config, LifecycleError, SchedulerKind, Server};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(arg) => match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("stintd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => PathBuf::from(arg),
        },
        None => {
            eprintln!("error: missing config file");
            eprintln!("Usage: stintd <config.toml>");
            std::process::exit(1);
        }
    };
    if let Some(extra) = args.next() {
        eprintln!("error: unexpected argument '{extra}'");
        eprintln!("Usage: stintd <config.toml>");
        std::process::exit(1);
    }

    let config = Config::load(&config_path)?;

    // Rotate the log file if it has grown too large, then set up logging
    rotate_log_if_needed(&config.log_path());
    let _log_guard = setup_logging(&config)?;

    info!("Starting stintd");

    // Create the ledger on first start; later starts resume against it
    config.ensure_ledger()?;

    match config.scheduler {
        SchedulerKind::Slurm => run(&config, SlurmAdapter::new(&config.log_folder)).await,
        SchedulerKind::Pbs => run(&config, PbsAdapter::new(&config.log_folder)).await,
    }
}

async fn run<S: SchedulerAdapter>(
    config: &Config,
    scheduler: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = match Server::start(config, scheduler).await {
        Ok(server) => server,
        Err(e @ LifecycleError::AlreadyStarted(_)) => {
            eprintln!("stintd is already running ({e})");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to start manager: {}", e);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(endpoint = %server.endpoint().display(), "Daemon ready");

    // Signal ready for a parent process waiting on startup
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }

    server.shutdown().await;
    info!("Daemon stopped");
    Ok(())
}

fn print_help() {
    println!("stintd {}", env!("CARGO_PKG_VERSION"));
    println!("Stint Daemon - keeps the learner ledger and assigns learners to cluster jobs");
    println!();
    println!("USAGE:");
    println!("    stintd <config.toml>");
    println!();
    println!("The daemon binds the configured endpoint, serves start/stop");
    println!("requests from worker jobs, and periodically reconciles claims");
    println!("against the cluster queue.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (stintd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `stintd.log` → `stintd.log.1` → `stintd.log.2` → `stintd.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .3 is deleted, .2→.3, .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Rotate current log → .1
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Rotation happens at startup via rotate_log_if_needed
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or(Path::new(".")),
        log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("stintd.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
