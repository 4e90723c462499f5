//! Heartbeat Integration Tests
//!
//! Tests for generation progress: ordering, heartbeat cadence and the
//! guarantee that no heartbeat follows the terminal event.

use std::sync::Mutex;
use std::time::Duration;

use runkeeper::adapters::{
    CannedGenerator, GenerateRequest, GenerationEvent, ProviderError, TextGenerator,
};

fn request(timeout: Duration, heartbeat: Duration) -> GenerateRequest {
    GenerateRequest {
        prompt: "Describe the plan\nsecond line".to_string(),
        model: "canned".to_string(),
        timeout,
        heartbeat_interval: heartbeat,
    }
}

async fn collect(
    generator: &CannedGenerator,
    request: &GenerateRequest,
) -> (Result<String, ProviderError>, Vec<GenerationEvent>) {
    let seen = Mutex::new(Vec::new());
    let progress = |event: GenerationEvent| seen.lock().unwrap().push(event);
    let result = generator.generate(request, &progress).await;
    (result, seen.into_inner().unwrap())
}

#[tokio::test]
async fn test_slow_call_emits_heartbeats_with_growing_elapsed() {
    let generator = CannedGenerator::new().with_delay(Duration::from_millis(350));
    let (result, events) = collect(
        &generator,
        &request(Duration::from_secs(5), Duration::from_millis(100)),
    )
    .await;

    assert_eq!(result.unwrap(), "[canned:canned] Describe the plan");

    let kinds: Vec<_> = events.iter().map(GenerationEvent::kind).collect();
    assert_eq!(kinds[0], "LOADING_MODEL");
    assert_eq!(kinds[1], "GENERATING");
    assert_eq!(*kinds.last().unwrap(), "DONE");

    let elapsed: Vec<Duration> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::Heartbeat { elapsed } => Some(*elapsed),
            _ => None,
        })
        .collect();
    assert!(elapsed.len() >= 2, "expected heartbeats, got {kinds:?}");
    assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
    assert!(elapsed[0] >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_zero_interval_disables_heartbeats() {
    let generator = CannedGenerator::new().with_delay(Duration::from_millis(150));
    let (result, events) = collect(
        &generator,
        &request(Duration::from_secs(5), Duration::ZERO),
    )
    .await;

    assert!(result.is_ok());
    assert!(!events
        .iter()
        .any(|e| matches!(e, GenerationEvent::Heartbeat { .. })));
}

#[tokio::test]
async fn test_timeout_reports_single_terminal_error() {
    let generator = CannedGenerator::new().with_delay(Duration::from_secs(5));
    let seen = Mutex::new(Vec::new());
    let progress = |event: GenerationEvent| seen.lock().unwrap().push(event);

    let result = generator
        .generate(
            &request(Duration::from_millis(200), Duration::from_millis(50)),
            &progress,
        )
        .await;
    assert!(matches!(result, Err(ProviderError::Timeout(_))));

    let count = seen.lock().unwrap().len();
    {
        let events = seen.lock().unwrap();
        let terminal = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal, 1);
        assert!(matches!(events.last(), Some(GenerationEvent::Error { .. })));
    }

    // Nothing arrives once the call has returned
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.lock().unwrap().len(), count);
}
