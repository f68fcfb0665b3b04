// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-writer manager loop.
//!
//! All ledger mutations — request-triggered and reconcile-triggered —
//! happen on this loop, one event at a time. Connection tasks only hand
//! requests over a channel and wait for the reply, so the claim
//! invariants hold without any locking beyond crash consistency.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stint_adapters::{expand_job_id, SchedulerAdapter};
use stint_core::{JobId, LearnerEntry, LearnerName};
use stint_storage::Ledger;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::protocol::{Reply, Request};

/// A request paired with the channel its reply must go down.
pub(crate) struct Envelope {
    pub request: Request,
    pub reply_tx: oneshot::Sender<Reply>,
}

/// Owner of the ledger's write path.
pub(crate) struct Manager<S> {
    ledger: Arc<Mutex<Ledger>>,
    scheduler: S,
    requests: mpsc::Receiver<Envelope>,
    reconcile_interval: Duration,
    strict_stop: bool,
    cancel: CancellationToken,
}

impl<S: SchedulerAdapter> Manager<S> {
    pub(crate) fn new(
        ledger: Arc<Mutex<Ledger>>,
        scheduler: S,
        requests: mpsc::Receiver<Envelope>,
        reconcile_interval: Duration,
        strict_stop: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            scheduler,
            requests,
            reconcile_interval,
            strict_stop,
            cancel,
        }
    }

    /// Run until cancelled or the request channel closes.
    ///
    /// Each branch is processed to completion before the next is polled,
    /// so no request or reconcile overlaps another ledger write.
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.reconcile_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; burn the first tick so a claim can
        // land before the first probe
        ticker.tick().await;

        info!(interval = ?self.reconcile_interval, "manager loop running");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                envelope = self.requests.recv() => match envelope {
                    Some(Envelope { request, reply_tx }) => {
                        let reply = self.dispatch(request);
                        // A dropped receiver just means the client hung up
                        let _ = reply_tx.send(reply);
                    }
                    None => break,
                },

                _ = ticker.tick() => self.reconcile().await,
            }
        }

        info!("manager loop stopped");
    }

    fn dispatch(&self, request: Request) -> Reply {
        match request {
            Request::Start {
                job_id,
                log_fname,
                job_name,
            } => self.handle_start(job_id, log_fname, job_name),
            Request::Stop { fname } => self.handle_stop(fname),
        }
    }

    /// Claim the first free learner for a starting job.
    fn handle_start(&self, job_id: JobId, log_fname: String, job_name: String) -> Reply {
        let mut ledger = self.ledger.lock();

        if let Some(entry) = ledger.find_by_job(&job_id) {
            // The worker was restarted without going through stop;
            // reported so the duplicate is diagnosable on the client side.
            return Reply::Error {
                message: format!(
                    "The job_id {} already exists in the database and runs {}",
                    job_id, entry.fname
                ),
            };
        }

        let Some(fname) = ledger.find_first_free().map(|entry| entry.fname.clone()) else {
            return Reply::Error {
                message: "No more learners to run in the database".to_string(),
            };
        };

        let output_logs: Vec<String> = self
            .scheduler
            .output_fnames(&job_name)
            .iter()
            .map(|template| expand_job_id(template, &job_id))
            .collect();

        info!(learner = %fname, job_id = %job_id, job_name = %job_name, "claiming learner");

        match ledger.update(&fname, |entry| {
            entry.claim(job_id, job_name, log_fname, output_logs)
        }) {
            Ok(_) => Reply::Fname { fname },
            Err(e) => {
                error!(learner = %fname, error = %e, "ledger write failed");
                Reply::Error {
                    message: format!("ledger write failed: {e}"),
                }
            }
        }
    }

    /// Mark a learner finished. Unknown or already-stopped names are a
    /// no-op unless strict mode is on; is_done only ever goes true.
    fn handle_stop(&self, fname: LearnerName) -> Reply {
        let mut ledger = self.ledger.lock();

        match ledger.update(&fname, LearnerEntry::complete) {
            Ok(true) => {
                info!(learner = %fname, "learner done");
                Reply::Null
            }
            Ok(false) if self.strict_stop => Reply::Error {
                message: format!("Unknown learner {fname}"),
            },
            Ok(false) => Reply::Null,
            Err(e) => {
                error!(learner = %fname, error = %e, "ledger write failed");
                Reply::Error {
                    message: format!("ledger write failed: {e}"),
                }
            }
        }
    }

    /// One reconcile tick: release learners whose jobs the cluster no
    /// longer knows. The cluster is authoritative on liveness, so a
    /// failed probe must never free anything.
    async fn reconcile(&self) {
        let queue = match self.scheduler.queue(true).await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "queue probe failed, skipping reconcile tick");
                return;
            }
        };

        let mut ledger = self.ledger.lock();
        let vanished: Vec<LearnerName> = ledger
            .entries()
            .into_iter()
            .filter(|entry| {
                entry
                    .job_id
                    .as_ref()
                    .is_some_and(|job_id| !queue.contains_key(job_id))
            })
            .map(|entry| entry.fname)
            .collect();

        for fname in vanished {
            info!(learner = %fname, "job vanished from queue, releasing learner");
            if let Err(e) = ledger.update(&fname, LearnerEntry::release) {
                error!(learner = %fname, error = %e, "failed to persist release");
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
