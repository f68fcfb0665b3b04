// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager lifecycle: configuration, startup, shutdown.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use parking_lot::Mutex;
use serde::Deserialize;
use stint_adapters::SchedulerAdapter;
use stint_core::{LearnerEntry, LearnerName};
use stint_storage::{Ledger, LedgerError};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::listener::Listener;
use crate::manager::{Envelope, Manager};

const DEFAULT_RECONCILE_INTERVAL_MS: u64 = 30_000;

fn default_reconcile_interval_ms() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_MS
}

/// Which cluster scheduler to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Slurm,
    Pbs,
}

/// Manager configuration, read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path of the ledger file
    pub db_fname: PathBuf,

    /// Socket bind address
    pub endpoint: PathBuf,

    /// Learners to populate the ledger with, in claim-priority order
    #[serde(default)]
    pub learners_fnames: Vec<LearnerName>,

    /// Reconciler tick period in milliseconds
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    /// Recreate the ledger on start
    #[serde(default)]
    pub overwrite_db: bool,

    /// Error reply on stop of an unknown learner instead of a no-op
    #[serde(default)]
    pub strict_stop: bool,

    /// Which cluster scheduler to probe
    #[serde(default)]
    pub scheduler: SchedulerKind,

    /// Folder for derived worker log paths
    #[serde(default)]
    pub log_folder: PathBuf,

    /// The daemon's own log file (defaults next to the socket)
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| LifecycleError::Config {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Lock/PID file guarding the endpoint.
    pub fn lock_path(&self) -> PathBuf {
        self.endpoint.with_extension("lock")
    }

    /// The daemon's own log file.
    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.endpoint.with_extension("log"))
    }

    /// Create the ledger from `learners_fnames` when missing or when
    /// `overwrite_db` is set; otherwise leave the existing file alone so
    /// a restart resumes against it.
    pub fn ensure_ledger(&self) -> Result<(), LifecycleError> {
        if self.db_fname.exists() && !self.overwrite_db {
            return Ok(());
        }
        if self.learners_fnames.is_empty() {
            return Err(LifecycleError::NoLearners(self.db_fname.clone()));
        }
        Ledger::init(&self.db_fname, &self.learners_fnames, self.overwrite_db)?;
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("ledger at {} is not initialized; configure learners_fnames or create it first", .0.display())]
    Uninitialized(PathBuf),

    #[error("manager already started: lock {} is held", .0.display())]
    AlreadyStarted(PathBuf),

    #[error("failed to bind socket at {}: {}", .0.display(), .1)]
    BindFailed(PathBuf, io::Error),

    #[error("no learners_fnames configured; refusing to create an empty ledger at {}", .0.display())]
    NoLearners(PathBuf),

    #[error("invalid config {}: {}", path.display(), source)]
    Config {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A started manager: the bound listener, the single-writer loop, and
/// snapshot access to the ledger for derived queries.
#[derive(Debug)]
pub struct Server {
    endpoint: PathBuf,
    lock_path: PathBuf,
    // NOTE(lifetime): held to keep the exclusive endpoint lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    ledger: Arc<Mutex<Ledger>>,
    cancel: CancellationToken,
    manager_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
}

impl Server {
    /// Bind the endpoint and start the manager loop.
    ///
    /// Fails with `Uninitialized` when the ledger file does not exist and
    /// `AlreadyStarted` when another instance holds the endpoint lock.
    pub async fn start<S: SchedulerAdapter>(
        config: &Config,
        scheduler: S,
    ) -> Result<Self, LifecycleError> {
        match Self::start_inner(config, scheduler).await {
            Ok(server) => Ok(server),
            Err(e) => {
                // Don't clean up if another instance owns these files
                if !matches!(e, LifecycleError::AlreadyStarted(_)) {
                    let _ = fs::remove_file(&config.endpoint);
                    let _ = fs::remove_file(config.lock_path());
                }
                Err(e)
            }
        }
    }

    async fn start_inner<S: SchedulerAdapter>(
        config: &Config,
        scheduler: S,
    ) -> Result<Self, LifecycleError> {
        if let Some(parent) = config.endpoint.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Acquire the lock FIRST - prevents races with a second instance.
        // OpenOptions keeps the file untruncated until we hold the lock,
        // so a losing instance can't wipe the winner's PID.
        let lock_path = config.lock_path();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| LifecycleError::AlreadyStarted(lock_path.clone()))?;

        // Write PID (truncate now that we hold the lock)
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;
        let lock_file = lock_file;

        let ledger = match Ledger::open(&config.db_fname) {
            Ok(ledger) => ledger,
            Err(LedgerError::Uninitialized(path)) => {
                return Err(LifecycleError::Uninitialized(path));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            db = %config.db_fname.display(),
            rows = ledger.len(),
            done = ledger.n_done(),
            "ledger opened"
        );

        // Remove stale socket and bind (only after all validation passes)
        if config.endpoint.exists() {
            fs::remove_file(&config.endpoint)?;
        }
        let socket = UnixListener::bind(&config.endpoint)
            .map_err(|e| LifecycleError::BindFailed(config.endpoint.clone(), e))?;

        let ledger = Arc::new(Mutex::new(ledger));
        let cancel = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel::<Envelope>(64);

        let manager = Manager::new(
            Arc::clone(&ledger),
            scheduler,
            request_rx,
            config.reconcile_interval(),
            config.strict_stop,
            cancel.clone(),
        );
        let manager_task = tokio::spawn(manager.run());

        let listener = Listener::new(socket, request_tx, cancel.clone());
        let listener_task = tokio::spawn(listener.run());

        info!(endpoint = %config.endpoint.display(), "manager started");

        Ok(Self {
            endpoint: config.endpoint.clone(),
            lock_path,
            lock_file,
            ledger,
            cancel,
            manager_task,
            listener_task,
        })
    }

    /// Endpoint the listener is bound to.
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Cancellation token for the manager loop; downstream code layers
    /// its own cancellation on top.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Count of finished learners.
    pub fn n_done(&self) -> usize {
        self.ledger.lock().n_done()
    }

    /// Snapshot of all rows, in insertion order.
    pub fn entries(&self) -> Vec<LearnerEntry> {
        self.ledger.lock().entries()
    }

    /// Learners that ran at least once but were released unfinished —
    /// callers collect the logs of crashed jobs from these rows.
    pub fn failed(&self) -> Vec<LearnerEntry> {
        self.ledger.lock().failed()
    }

    /// Stop accepting new requests, wait for in-flight work, release the
    /// endpoint. Writes already applied are durable.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.manager_task.await {
            warn!("manager task failed: {}", e);
        }
        if let Err(e) = self.listener_task.await {
            warn!("listener task failed: {}", e);
        }

        if let Err(e) = fs::remove_file(&self.endpoint) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove socket file: {}", e);
            }
        }
        let _ = fs::remove_file(&self.lock_path);

        info!("manager stopped");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
