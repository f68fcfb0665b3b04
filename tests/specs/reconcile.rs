//! Reconciler specs: release on vanished jobs, inertness on probe failure.

use crate::prelude::*;
use stint_core::LearnerName;

#[tokio::test]
async fn vanished_job_releases_the_learner() {
    let dep = Deployment::with_interval(&["a.pkl"], 50);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    let fname = client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    assert_eq!(fname, LearnerName::from("a.pkl"));

    // The cluster queue never lists J1, so a tick releases the claim
    assert!(wait_for(|| dep.row("a.pkl").job_id.is_none()).await);

    let row = dep.row("a.pkl");
    assert!(!row.is_done);
    assert!(row.log_fname.is_none());
    assert!(row.output_logs.is_empty());

    // The learner shows up as failed (ran once, never finished)...
    let failed = server.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].fname, LearnerName::from("a.pkl"));

    // ...and is claimable again
    let fname = client.start(&job("J9"), "l9.log", "job9").await.unwrap();
    assert_eq!(fname, LearnerName::from("a.pkl"));

    server.shutdown().await;
}

#[tokio::test]
async fn tracked_jobs_survive_reconciliation() {
    let dep = Deployment::with_interval(&["a.pkl"], 50);
    dep.scheduler.set_jobs(&[("J1", "job1")]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    let probes_before = dep.scheduler.calls().len();

    // Let a few ticks pass with the job still queued
    assert!(wait_for(|| dep.scheduler.calls().len() >= probes_before + 2).await);

    let row = dep.row("a.pkl");
    assert_eq!(row.job_id.as_ref().unwrap(), "J1");

    server.shutdown().await;
}

#[tokio::test]
async fn probe_outage_is_inert() {
    let dep = Deployment::with_interval(&["a.pkl"], 50);
    // The probe fails from the very first tick
    dep.scheduler.fail_queue("connection to slurmctld failed");
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    let before = dep.db_bytes();

    // Observe at least two failed ticks
    let probes_before = dep.scheduler.calls().len();
    assert!(wait_for(|| dep.scheduler.calls().len() >= probes_before + 2).await);
    assert_eq!(dep.db_bytes(), before);

    // Once the probe recovers and still lists J1, still no change
    dep.scheduler.set_jobs(&[("J1", "job1")]);
    let probes_before = dep.scheduler.calls().len();
    assert!(wait_for(|| dep.scheduler.calls().len() >= probes_before + 2).await);
    assert_eq!(dep.db_bytes(), before);

    server.shutdown().await;
}
