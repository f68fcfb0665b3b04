//! Claim lifecycle specs: cold start, duplicates, stop, exhaustion.

use crate::prelude::*;
use stint_core::LearnerName;
use stint_daemon::ClientError;

#[tokio::test]
async fn cold_start_and_first_claim() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    let fname = client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    assert_eq!(fname, LearnerName::from("a.pkl"));

    let row = dep.row("a.pkl");
    assert_eq!(row.job_id.as_ref().unwrap(), "J1");
    assert_eq!(row.log_fname.as_deref(), Some("l1.log"));
    assert_eq!(row.job_name.as_deref(), Some("job1"));
    assert!(!row.is_done);

    server.shutdown().await;
}

#[tokio::test]
async fn duplicate_job_id_is_diagnosed() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    let before = dep.ledger_rows();

    let err = client
        .start(&job("J1"), "l1.log", "job1")
        .await
        .unwrap_err();
    match err {
        ClientError::Server(message) => {
            assert!(message.contains("already exists"));
            assert!(message.contains("a.pkl"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(dep.ledger_rows(), before);

    server.shutdown().await;
}

#[tokio::test]
async fn stop_and_reclaim_skips_terminal_rows() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    client.stop(&LearnerName::from("a.pkl")).await.unwrap();

    let row = dep.row("a.pkl");
    assert!(row.is_done);
    assert!(row.job_id.is_none());

    let fname = client.start(&job("J2"), "l2.log", "job2").await.unwrap();
    assert_eq!(fname, LearnerName::from("b.pkl"));

    server.shutdown().await;
}

#[tokio::test]
async fn exhaustion_is_reported() {
    let dep = Deployment::new(&["a.pkl", "b.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    client.stop(&LearnerName::from("a.pkl")).await.unwrap();
    client.start(&job("J2"), "l2.log", "job2").await.unwrap();
    client.stop(&LearnerName::from("b.pkl")).await.unwrap();

    let err = client
        .start(&job("J3"), "l3.log", "job3")
        .await
        .unwrap_err();
    match err {
        ClientError::Server(message) => {
            assert_eq!(message, "No more learners to run in the database");
        }
        other => panic!("expected server error, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn stop_is_idempotent_over_the_wire() {
    let dep = Deployment::new(&["a.pkl"]);
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    let fname = client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    client.stop(&fname).await.unwrap();
    let first = dep.row("a.pkl");

    client.stop(&fname).await.unwrap();
    assert_eq!(dep.row("a.pkl"), first);
    assert_eq!(server.n_done(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn group_learner_names_roundtrip_verbatim() {
    let group = LearnerName::from(["part1.pkl", "part2.pkl"].as_slice());
    let dep = Deployment::with_learners(
        vec![group.clone(), LearnerName::from("single.pkl")],
        30_000,
    );
    dep.init();
    let server = dep.start().await;
    let mut client = dep.client().await;

    let fname = client.start(&job("J1"), "l1.log", "job1").await.unwrap();
    assert_eq!(fname, group);

    client.stop(&group).await.unwrap();
    let fname = client.start(&job("J2"), "l2.log", "job2").await.unwrap();
    assert_eq!(fname, LearnerName::from("single.pkl"));

    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_workers_never_share_a_learner() {
    let dep = Deployment::new(&["a.pkl", "b.pkl", "c.pkl"]);
    dep.init();
    let server = dep.start().await;

    let mut claimed = Vec::new();
    for worker in ["J1", "J2", "J3"] {
        let mut client = dep.client().await;
        claimed.push(
            client
                .start(&job(worker), "l.log", "job")
                .await
                .unwrap(),
        );
    }

    let mut deduped = claimed.clone();
    deduped.sort_by_key(|n| n.to_string());
    deduped.dedup();
    assert_eq!(claimed.len(), deduped.len());

    server.shutdown().await;
}
