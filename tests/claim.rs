//! Claim Integration Tests
//!
//! Tests that a queued run is claimed exactly once, even under contention.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use runkeeper::adapters::{CannedGenerator, ProviderRegistry};
use runkeeper::core::run_store::new_run;
use runkeeper::core::{
    ClaimOutcome, Database, EventLog, GenerationSettings, RunScheduler, RunStore,
    SchedulerSettings, WorkflowRegistry,
};
use runkeeper::domain::{kinds, RunStatus, RunType};
use tempfile::TempDir;
use uuid::Uuid;

fn open(temp: &TempDir) -> Database {
    Database::open(temp.path().join("claim.db")).unwrap()
}

fn scheduler(db: &Database) -> RunScheduler {
    RunScheduler::new(
        db.clone(),
        ProviderRegistry::new("canned").with(Arc::new(CannedGenerator::new())),
        Arc::new(WorkflowRegistry::builtin()),
        SchedulerSettings {
            simulation_delay: Duration::ZERO,
            generation: GenerationSettings {
                timeout: Duration::from_secs(5),
                heartbeat_interval: Duration::ZERO,
            },
            role_models: HashMap::new(),
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    let store = RunStore::new(db.clone());
    let run = new_run("race", RunType::Agent);
    store.create(&run).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = RunStore::new(db.clone());
        let id = run.id;
        handles.push(tokio::task::spawn_blocking(move || store.claim(&id).unwrap()));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_claimed() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let started = EventLog::new(db)
        .list(&run.id, None)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == kinds::RUN_STARTED)
        .count();
    assert_eq!(started, 1);
    assert_eq!(store.get(&run.id).unwrap().status, RunStatus::Running);
}

#[test]
fn test_claim_returns_running_snapshot() {
    let temp = TempDir::new().unwrap();
    let store = RunStore::new(open(&temp));
    let run = new_run("snapshot", RunType::Task);
    store.create(&run).unwrap();

    match store.claim(&run.id).unwrap() {
        ClaimOutcome::Claimed(claimed) => {
            assert_eq!(claimed.id, run.id);
            assert_eq!(claimed.status, RunStatus::Running);
            assert_eq!(claimed.goal, "snapshot");
        }
        other => panic!("first claim should win, got {other:?}"),
    }
}

#[test]
fn test_reclaim_and_unknown_run_are_not_claimed() {
    let temp = TempDir::new().unwrap();
    let store = RunStore::new(open(&temp));
    let run = new_run("once", RunType::Agent);
    store.create(&run).unwrap();

    assert!(store.claim(&run.id).unwrap().is_claimed());
    assert!(!store.claim(&run.id).unwrap().is_claimed());
    assert!(!store.claim(&Uuid::new_v4()).unwrap().is_claimed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_execute_completes_once() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    let run = new_run("double dispatch", RunType::Agent);
    RunStore::new(db.clone()).create(&run).unwrap();

    let a = Arc::new(scheduler(&db));
    let b = Arc::new(scheduler(&db));
    let id = run.id;
    let first = tokio::spawn(async move { a.execute_run(id).await });
    let second = tokio::spawn(async move { b.execute_run(id).await });

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);

    let events = EventLog::new(db.clone()).list(&run.id, None).unwrap();
    let count = |kind: &str| events.iter().filter(|e| e.event_type == kind).count();
    assert_eq!(count(kinds::RUN_STARTED), 1);
    assert_eq!(count(kinds::RUN_COMPLETED), 1);
    assert_eq!(count(kinds::AGENT_THINKING), 1);
}

#[tokio::test]
async fn test_execute_non_queued_run_returns_false() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    let store = RunStore::new(db.clone());
    let run = new_run("already running", RunType::Agent);
    store.create(&run).unwrap();
    store.claim(&run.id).unwrap();

    let before = EventLog::new(db.clone()).list(&run.id, None).unwrap().len();
    assert!(!scheduler(&db).execute_run(run.id).await);

    let after = EventLog::new(db).list(&run.id, None).unwrap().len();
    assert_eq!(before, after);
    assert_eq!(store.get(&run.id).unwrap().status, RunStatus::Running);
}

#[tokio::test]
async fn test_unreadable_claimed_run_is_marked_failed() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    let run = new_run("corrupt row", RunType::Agent);
    RunStore::new(db.clone()).create(&run).unwrap();

    db.connect()
        .unwrap()
        .execute(
            "UPDATE runs SET metadata = 'not json' WHERE id = ?1",
            [run.id.to_string()],
        )
        .unwrap();

    assert!(!scheduler(&db).execute_run(run.id).await);

    let status: String = db
        .connect()
        .unwrap()
        .query_row(
            "SELECT status FROM runs WHERE id = ?1",
            [run.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "FAILED");

    let types: Vec<_> = EventLog::new(db)
        .list(&run.id, None)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![kinds::RUN_CREATED, kinds::RUN_STARTED, kinds::RUN_FAILED]
    );
}
