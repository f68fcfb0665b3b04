// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Batch-scheduler adapters: the queue probe and log-path conventions
//! the reconciliation service depends on.

mod pbs;
mod slurm;

pub use pbs::PbsAdapter;
pub use slurm::SlurmAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSchedulerAdapter, ProbeCall};

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use stint_core::JobId;
use thiserror::Error;

/// Placeholder in derived paths, substituted with the cluster-assigned
/// job id at claim time. The batch script carries the same literal so
/// the scheduler performs the identical substitution on its side.
pub const JOB_ID_VARIABLE: &str = "${JOB_ID}";

/// Substitute the job-id placeholder in a derived path.
pub fn expand_job_id(path: &str, job_id: &JobId) -> String {
    path.replace(JOB_ID_VARIABLE, job_id.as_str())
}

/// Worker log path for a job name, placeholder intact:
/// `<log_folder>/<job_name>-${JOB_ID}.log`.
pub fn derived_log_fname(log_folder: &Path, job_name: &str) -> String {
    log_folder
        .join(format!("{job_name}-{JOB_ID_VARIABLE}.log"))
        .to_string_lossy()
        .into_owned()
}

/// Scheduler output paths attributed to a job at claim time: the worker
/// log path with an `.out` extension.
pub fn derived_output_fnames(log_folder: &Path, job_name: &str) -> Vec<String> {
    let log_fname = log_folder.join(format!("{job_name}-{JOB_ID_VARIABLE}.out"));
    vec![log_fname.to_string_lossy().into_owned()]
}

/// Errors from queue probes
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to invoke {command}: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("unparseable queue line: {0:?}")]
    Parse(String),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// A queue row as reported by the cluster scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Human job label as submitted.
    pub job_name: String,
    /// Scheduler state string, passed through uninterpreted (e.g. "R", "PD").
    pub state: String,
}

/// Adapter for a batch scheduler's queue and log-file conventions.
///
/// `queue` is the single source of truth on job liveness; everything else
/// is pure path derivation.
#[async_trait]
pub trait SchedulerAdapter: Clone + Send + Sync + 'static {
    /// Jobs currently known to the cluster queue, keyed by job id.
    ///
    /// With `me_only`, restricts the probe to the calling user's jobs.
    async fn queue(&self, me_only: bool) -> Result<HashMap<JobId, QueueEntry>, SchedulerError>;

    /// Worker log path for a job name, with the job-id placeholder intact.
    fn log_fname(&self, job_name: &str) -> String;

    /// Scheduler output paths attributed to a job at claim time, with the
    /// job-id placeholder intact.
    fn output_fnames(&self, job_name: &str) -> Vec<String>;
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
