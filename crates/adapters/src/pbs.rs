// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PBS/Torque queue probe via `qstat`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use stint_core::JobId;
use tokio::process::Command;
use tracing::debug;

use crate::{
    derived_log_fname, derived_output_fnames, QueueEntry, SchedulerAdapter, SchedulerError,
};

/// Queue probe for PBS-family schedulers (PBS Pro, Torque).
#[derive(Debug, Clone)]
pub struct PbsAdapter {
    log_folder: PathBuf,
}

impl PbsAdapter {
    pub fn new(log_folder: impl Into<PathBuf>) -> Self {
        Self {
            log_folder: log_folder.into(),
        }
    }

    async fn run_qstat(&self) -> Result<String, SchedulerError> {
        let output = Command::new("qstat")
            .output()
            .await
            .map_err(|source| SchedulerError::Spawn {
                command: "qstat",
                source,
            })?;

        if !output.status.success() {
            return Err(SchedulerError::CommandFailed {
                command: "qstat",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SchedulerAdapter for PbsAdapter {
    async fn queue(&self, me_only: bool) -> Result<HashMap<JobId, QueueEntry>, SchedulerError> {
        // An unfiltered probe could mistake another user's job id for
        // one of ours, so me_only without a resolvable user is an error
        let only_user = if me_only {
            match std::env::var("USER") {
                Ok(user) => Some(user),
                Err(_) => {
                    return Err(SchedulerError::Unavailable(
                        "$USER not set for me_only probe".to_string(),
                    ));
                }
            }
        } else {
            None
        };
        let stdout = self.run_qstat().await?;
        let queue = parse_qstat(&stdout, only_user.as_deref())?;
        debug!(jobs = queue.len(), "qstat probe");
        Ok(queue)
    }

    fn log_fname(&self, job_name: &str) -> String {
        derived_log_fname(&self.log_folder, job_name)
    }

    fn output_fnames(&self, job_name: &str) -> Vec<String> {
        derived_output_fnames(&self.log_folder, job_name)
    }
}

/// Parse default `qstat` tabular output:
///
/// ```text
/// Job id            Name             User             Time Use S Queue
/// ----------------  ---------------- ---------------  -------- - -----
/// 1234.pbs-server   job-a            alice            00:00:10 R batch
/// ```
///
/// Job ids are truncated at the first dot, matching the short form
/// workers see in `$PBS_JOBID`.
pub(crate) fn parse_qstat(
    stdout: &str,
    only_user: Option<&str>,
) -> Result<HashMap<JobId, QueueEntry>, SchedulerError> {
    let mut queue = HashMap::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.to_ascii_lowercase().starts_with("job id")
            || line.chars().all(|c| c == '-' || c == ' ')
        {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [job_id, job_name, user, _time, state, _queue, ..] = fields.as_slice() else {
            return Err(SchedulerError::Parse(line.to_string()));
        };

        if only_user.is_some_and(|u| u != *user) {
            continue;
        }

        let short_id = job_id.split('.').next().unwrap_or(job_id);
        queue.insert(
            JobId::new(short_id),
            QueueEntry {
                job_name: job_name.to_string(),
                state: state.to_string(),
            },
        );
    }

    Ok(queue)
}

#[cfg(test)]
#[path = "pbs_tests.rs"]
mod tests;
