// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger rows.

use serde::{Deserialize, Serialize};

use crate::{JobId, LearnerName};

/// One row of the ledger: a learner and the cluster job currently running
/// it, if any.
///
/// Rows move through three states: fresh (no owner, not done), claimed
/// (owned by a live job), and done (terminal). A claimed row whose job
/// vanishes from the cluster queue is released back to fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerEntry {
    /// Primary key: the learner's state file(s).
    pub fname: LearnerName,
    /// Id of the cluster job currently running this learner; `None` when free.
    pub job_id: Option<JobId>,
    /// True once the learner reported completion. Terminal and sticky.
    pub is_done: bool,
    /// Set on first claim, never cleared. Distinguishes rows that were
    /// released after their job vanished from rows that never ran.
    #[serde(default)]
    pub was_claimed: bool,
    /// Human label of the owning job.
    pub job_name: Option<String>,
    /// Path of the worker's log file.
    pub log_fname: Option<String>,
    /// Scheduler stdout/stderr paths derived at claim time.
    #[serde(default)]
    pub output_logs: Vec<String>,
}

impl LearnerEntry {
    /// A row as created by `init`: unclaimed and not done.
    pub fn fresh(fname: LearnerName) -> Self {
        Self {
            fname,
            job_id: None,
            is_done: false,
            was_claimed: false,
            job_name: None,
            log_fname: None,
            output_logs: Vec::new(),
        }
    }

    /// A row is free when no live job owns it and it has not finished.
    pub fn is_free(&self) -> bool {
        self.job_id.is_none() && !self.is_done
    }

    /// Bind this learner to a starting job.
    pub fn claim(
        &mut self,
        job_id: JobId,
        job_name: String,
        log_fname: String,
        output_logs: Vec<String>,
    ) {
        self.job_id = Some(job_id);
        self.job_name = Some(job_name);
        self.log_fname = Some(log_fname);
        self.output_logs = output_logs;
        self.was_claimed = true;
    }

    /// Clear the claim after the owning job vanished from the cluster
    /// queue. Completion state is untouched; the row is claimable again.
    pub fn release(&mut self) {
        self.job_id = None;
        self.log_fname = None;
        self.output_logs.clear();
    }

    /// Mark the learner finished. Terminal: the row is never handed out
    /// again. Repeated calls settle on the same state.
    pub fn complete(&mut self) {
        self.job_id = None;
        self.is_done = true;
        self.job_name = None;
        self.log_fname = None;
        self.output_logs.clear();
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
