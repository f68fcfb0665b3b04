//! Restart specs: resuming a ledger across manager restarts.

use crate::prelude::*;
use stint_core::LearnerName;
use stint_storage::{Ledger, LedgerError};

#[tokio::test]
async fn restart_resumes_the_ledger_without_reinit() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();

    let server = dep.start().await;
    let mut client = dep.client().await;
    let fname = client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    client.stop(&fname).await.unwrap();
    server.shutdown().await;

    // Same endpoint, same ledger; init is not run again
    let server = dep.start().await;
    assert_eq!(server.n_done(), 1);

    let mut client = dep.client().await;
    let fname = client.start(&job("J2"), "l2.log", "job2").await.unwrap();
    assert_eq!(fname, LearnerName::from("b.pkl"));

    server.shutdown().await;
}

#[tokio::test]
async fn claims_survive_a_restart() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();

    let server = dep.start().await;
    let mut client = dep.client().await;
    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    server.shutdown().await;

    let server = dep.start().await;
    let row = dep.row("a.pkl");
    assert_eq!(row.job_id.as_ref().unwrap(), "J1");

    // The restarted manager still refuses a duplicate claim for J1
    let mut client = dep.client().await;
    let err = client
        .start(&job("J1"), "l1.log", "job1")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    server.shutdown().await;
}

#[tokio::test]
async fn reinit_without_overwrite_is_refused() {
    let dep = Deployment::new(&["a.pkl"]);
    dep.init();

    let names = vec![LearnerName::from("a.pkl")];
    let err = Ledger::init(&dep.config.db_fname, &names, false).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyInitialized(_)));

    // With overwrite the ledger is recreated from scratch
    Ledger::init(&dep.config.db_fname, &names, true).unwrap();
    assert_eq!(dep.ledger_rows().len(), 1);
}

#[tokio::test]
async fn ledger_file_stays_operator_inspectable() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;
    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    server.shutdown().await;

    // One JSON object per line, readable with ordinary tools
    let contents = String::from_utf8(dep.db_bytes()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        serde_json::from_str::<serde_json::Value>(line).unwrap();
    }
}
