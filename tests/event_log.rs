//! Event Log Integration Tests
//!
//! Tests for append order, cursor-based listing and the live tail.

use std::time::Duration;

use futures::StreamExt;
use runkeeper::core::{Database, EventLog, TailItem, TailOptions};
use tempfile::TempDir;
use uuid::Uuid;

fn log(temp: &TempDir) -> EventLog {
    EventLog::new(Database::open(temp.path().join("events.db")).unwrap())
}

fn fast_tail() -> TailOptions {
    TailOptions {
        poll_interval: Duration::from_millis(10),
        keepalive_interval: Duration::from_millis(50),
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_ids_increase_across_runs() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = log.record(&a, "ONE", "").unwrap();
    let second = log.record(&b, "TWO", "").unwrap();
    let third = log.record(&a, "THREE", "").unwrap();

    assert!(first.id < second.id);
    assert!(second.id < third.id);
    assert!(first.created_at <= third.created_at);
}

#[test]
fn test_after_id_returns_exact_suffix() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();

    let recorded: Vec<_> = (1..=5)
        .map(|i| log.record(&run, "STEP", &format!("payload {i}")).unwrap())
        .collect();

    let all = log.list(&run, None).unwrap();
    assert_eq!(all, recorded);

    let suffix = log.list(&run, Some(recorded[1].id)).unwrap();
    assert_eq!(suffix, recorded[2..].to_vec());

    let none = log.list(&run, Some(recorded[4].id)).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_record_all_is_contiguous() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();

    let events = log
        .record_all(&run, &[("STEP_COMPLETED", "done"), ("ARTIFACT_CREATED", "Artifact: a.txt")])
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[1].id, events[0].id + 1);
    assert_eq!(log.list(&run, None).unwrap(), events);
}

#[tokio::test]
async fn test_tail_replays_then_follows() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();
    log.record(&run, "FIRST", "1").unwrap();
    log.record(&run, "SECOND", "2").unwrap();

    let mut tail = Box::pin(log.tail(run, 0, fast_tail()));

    let mut seen = Vec::new();
    while seen.len() < 2 {
        match tokio::time::timeout(WAIT, tail.next()).await.unwrap() {
            Some(Ok(TailItem::Event(event))) => seen.push(event.event_type),
            Some(Ok(TailItem::KeepAlive)) => {}
            other => panic!("unexpected tail item: {other:?}"),
        }
    }
    assert_eq!(seen, vec!["FIRST", "SECOND"]);

    log.record(&run, "THIRD", "3").unwrap();
    loop {
        match tokio::time::timeout(WAIT, tail.next()).await.unwrap() {
            Some(Ok(TailItem::Event(event))) => {
                assert_eq!(event.event_type, "THIRD");
                break;
            }
            Some(Ok(TailItem::KeepAlive)) => {}
            other => panic!("unexpected tail item: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_tail_resumes_from_cursor() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();
    let first = log.record(&run, "FIRST", "").unwrap();
    log.record(&run, "SECOND", "").unwrap();

    let mut tail = Box::pin(log.tail(run, first.id, fast_tail()));
    match tokio::time::timeout(WAIT, tail.next()).await.unwrap() {
        Some(Ok(TailItem::Event(event))) => assert_eq!(event.event_type, "SECOND"),
        other => panic!("unexpected tail item: {other:?}"),
    }
}

#[tokio::test]
async fn test_tail_emits_keepalive_when_quiet() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();

    let mut tail = Box::pin(log.tail(run, 0, fast_tail()));
    let item = tokio::time::timeout(WAIT, tail.next()).await.unwrap();
    assert!(matches!(item, Some(Ok(TailItem::KeepAlive))));
}

#[tokio::test]
async fn test_tail_does_not_end_after_terminal_event() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();
    log.record(&run, "RUN_COMPLETED", "Run completed successfully").unwrap();

    let mut tail = Box::pin(log.tail(run, 0, fast_tail()));
    let first = tokio::time::timeout(WAIT, tail.next()).await.unwrap();
    assert!(matches!(first, Some(Ok(TailItem::Event(_)))));

    // The stream keeps producing keepalives rather than ending
    let next = tokio::time::timeout(WAIT, tail.next()).await.unwrap();
    assert!(matches!(next, Some(Ok(TailItem::KeepAlive))));
}

#[tokio::test]
async fn test_independent_tails_see_same_order() {
    let temp = TempDir::new().unwrap();
    let log = log(&temp);
    let run = Uuid::new_v4();
    for kind in ["A", "B", "C"] {
        log.record(&run, kind, "").unwrap();
    }

    let mut orders = Vec::new();
    for _ in 0..2 {
        let mut tail = Box::pin(log.tail(run, 0, fast_tail()));
        let mut ids = Vec::new();
        while ids.len() < 3 {
            if let Some(Ok(TailItem::Event(event))) =
                tokio::time::timeout(WAIT, tail.next()).await.unwrap()
            {
                ids.push(event.id);
            }
        }
        orders.push(ids);
    }
    assert_eq!(orders[0], orders[1]);
}
