//! Test helpers for behavioral specifications.
//!
//! Spins up a full in-process manager (ledger + socket + reconciler)
//! with a scripted fake scheduler and drives it through the worker
//! client.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use stint_adapters::FakeSchedulerAdapter;
use stint_core::{JobId, LearnerEntry, LearnerName};
use stint_daemon::{Client, Config, SchedulerKind, Server};
use stint_storage::Ledger;

// Spec polling timeouts
pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// A temporary deployment: config, ledger and socket under one tempdir.
pub struct Deployment {
    dir: tempfile::TempDir,
    pub config: Config,
    pub scheduler: FakeSchedulerAdapter,
}

impl Deployment {
    /// Deployment with the default 30s reconcile interval, which never
    /// fires within a test.
    pub fn new(names: &[&str]) -> Self {
        Self::with_interval(names, 30_000)
    }

    pub fn with_interval(names: &[&str], reconcile_interval_ms: u64) -> Self {
        Self::with_learners(
            names.iter().map(|n| LearnerName::from(*n)).collect(),
            reconcile_interval_ms,
        )
    }

    pub fn with_learners(learners_fnames: Vec<LearnerName>, reconcile_interval_ms: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_fname: dir.path().join("ledger.jsonl"),
            endpoint: dir.path().join("stint.sock"),
            learners_fnames,
            reconcile_interval_ms,
            overwrite_db: false,
            strict_stop: false,
            scheduler: SchedulerKind::Slurm,
            log_folder: PathBuf::new(),
            log_path: None,
        };
        Self {
            dir,
            config,
            scheduler: FakeSchedulerAdapter::new(),
        }
    }

    /// Initialize the ledger from the configured learner list.
    pub fn init(&self) {
        self.config.ensure_ledger().unwrap();
    }

    /// Start the manager. The ledger must have been initialized.
    pub async fn start(&self) -> Server {
        Server::start(&self.config, self.scheduler.clone())
            .await
            .unwrap()
    }

    /// Dial the manager's endpoint as a worker would.
    pub async fn client(&self) -> Client {
        Client::connect(&self.config.endpoint)
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(2))
    }

    /// Read the persisted ledger directly, bypassing the server.
    pub fn ledger_rows(&self) -> Vec<LearnerEntry> {
        Ledger::open(&self.config.db_fname).unwrap().entries()
    }

    /// The persisted row for a single-path learner name.
    pub fn row(&self, fname: &str) -> LearnerEntry {
        let name = LearnerName::from(fname);
        self.ledger_rows()
            .into_iter()
            .find(|entry| entry.fname == name)
            .unwrap()
    }

    /// Raw bytes of the ledger file, for byte-identity assertions.
    pub fn db_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.config.db_fname).unwrap()
    }
}

pub fn job(id: &str) -> JobId {
    JobId::new(id)
}

/// Poll a condition until it returns true or the spec timeout elapses.
pub async fn wait_for<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
    false
}
