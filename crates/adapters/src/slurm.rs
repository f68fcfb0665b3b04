// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SLURM queue probe via `squeue`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use stint_core::JobId;
use tokio::process::Command;
use tracing::debug;

use crate::{
    derived_log_fname, derived_output_fnames, QueueEntry, SchedulerAdapter, SchedulerError,
};

/// Queue probe for the SLURM workload manager.
#[derive(Debug, Clone)]
pub struct SlurmAdapter {
    log_folder: PathBuf,
}

impl SlurmAdapter {
    pub fn new(log_folder: impl Into<PathBuf>) -> Self {
        Self {
            log_folder: log_folder.into(),
        }
    }

    async fn run_squeue(&self, me_only: bool) -> Result<String, SchedulerError> {
        let mut cmd = Command::new("squeue");
        // %i/%j/%T: job id, name, long state. --array expands array tasks
        // so each task id matches what the worker sees in SLURM_JOB_ID.
        cmd.args(["--noheader", "--array", "-o", "%i\t%j\t%T"]);
        if me_only {
            cmd.arg("--me");
        }

        let output = cmd.output().await.map_err(|source| SchedulerError::Spawn {
            command: "squeue",
            source,
        })?;

        if !output.status.success() {
            return Err(SchedulerError::CommandFailed {
                command: "squeue",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SchedulerAdapter for SlurmAdapter {
    async fn queue(&self, me_only: bool) -> Result<HashMap<JobId, QueueEntry>, SchedulerError> {
        let stdout = self.run_squeue(me_only).await?;
        let queue = parse_squeue(&stdout)?;
        debug!(jobs = queue.len(), "squeue probe");
        Ok(queue)
    }

    fn log_fname(&self, job_name: &str) -> String {
        derived_log_fname(&self.log_folder, job_name)
    }

    fn output_fnames(&self, job_name: &str) -> Vec<String> {
        derived_output_fnames(&self.log_folder, job_name)
    }
}

/// Parse tab-separated `squeue --noheader -o "%i\t%j\t%T"` output.
pub(crate) fn parse_squeue(stdout: &str) -> Result<HashMap<JobId, QueueEntry>, SchedulerError> {
    let mut queue = HashMap::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.splitn(3, '\t');
        let (Some(job_id), Some(job_name), Some(state)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(SchedulerError::Parse(line.to_string()));
        };

        queue.insert(
            JobId::new(job_id),
            QueueEntry {
                job_name: job_name.to_string(),
                state: state.trim().to_string(),
            },
        );
    }

    Ok(queue)
}

#[cfg(test)]
#[path = "slurm_tests.rs"]
mod tests;
