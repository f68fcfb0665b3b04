// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake scheduler adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stint_core::JobId;

use crate::{
    derived_log_fname, derived_output_fnames, QueueEntry, SchedulerAdapter, SchedulerError,
};

/// Recorded queue probe
#[derive(Debug, Clone)]
pub struct ProbeCall {
    pub me_only: bool,
}

struct FakeSchedulerState {
    queue: Result<HashMap<JobId, QueueEntry>, String>,
    calls: Vec<ProbeCall>,
}

/// Fake scheduler adapter with a scripted queue result.
#[derive(Clone)]
pub struct FakeSchedulerAdapter {
    log_folder: PathBuf,
    inner: Arc<Mutex<FakeSchedulerState>>,
}

impl Default for FakeSchedulerAdapter {
    fn default() -> Self {
        Self {
            log_folder: PathBuf::new(),
            inner: Arc::new(Mutex::new(FakeSchedulerState {
                queue: Ok(HashMap::new()),
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeSchedulerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next probes to report exactly these running jobs.
    pub fn set_jobs(&self, jobs: &[(&str, &str)]) {
        let queue = jobs
            .iter()
            .map(|(job_id, job_name)| {
                (
                    JobId::new(*job_id),
                    QueueEntry {
                        job_name: job_name.to_string(),
                        state: "R".to_string(),
                    },
                )
            })
            .collect();
        self.inner.lock().queue = Ok(queue);
    }

    /// Script the next probes to fail, as during a cluster-side outage.
    pub fn fail_queue(&self, message: &str) {
        self.inner.lock().queue = Err(message.to_string());
    }

    /// All recorded probes, in order.
    pub fn calls(&self) -> Vec<ProbeCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl SchedulerAdapter for FakeSchedulerAdapter {
    async fn queue(&self, me_only: bool) -> Result<HashMap<JobId, QueueEntry>, SchedulerError> {
        let mut state = self.inner.lock();
        state.calls.push(ProbeCall { me_only });
        match &state.queue {
            Ok(queue) => Ok(queue.clone()),
            Err(message) => Err(SchedulerError::Unavailable(message.clone())),
        }
    }

    fn log_fname(&self, job_name: &str) -> String {
        derived_log_fname(&self.log_folder, job_name)
    }

    fn output_fnames(&self, job_name: &str) -> Vec<String> {
        derived_output_fnames(&self.log_folder, job_name)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
