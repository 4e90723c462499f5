//! HTTP Integration Tests
//!
//! Drives the router over a real local socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use runkeeper::adapters::{CannedGenerator, ProviderRegistry};
use runkeeper::core::{
    Database, GenerationSettings, RunScheduler, RunService, SchedulerSettings, TailOptions,
    WorkflowRegistry,
};
use runkeeper::http::{create_router, HttpState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct Server {
    _temp: TempDir,
    base: String,
    client: reqwest::Client,
}

async fn start() -> Server {
    start_with_origins(Vec::new()).await
}

async fn start_with_origins(cors_origins: Vec<String>) -> Server {
    let temp = TempDir::new().unwrap();
    let db = Database::open(temp.path().join("http.db")).unwrap();
    let providers = ProviderRegistry::new("canned").with(Arc::new(CannedGenerator::new()));
    let workflows = Arc::new(WorkflowRegistry::builtin());

    let scheduler = Arc::new(RunScheduler::new(
        db.clone(),
        providers.clone(),
        Arc::clone(&workflows),
        SchedulerSettings {
            simulation_delay: Duration::ZERO,
            generation: GenerationSettings {
                timeout: Duration::from_secs(5),
                heartbeat_interval: Duration::ZERO,
            },
            role_models: HashMap::new(),
        },
    ));
    let state = Arc::new(HttpState {
        service: RunService::new(db, providers, workflows),
        scheduler,
        tail: TailOptions {
            poll_interval: Duration::from_millis(10),
            keepalive_interval: Duration::from_millis(200),
        },
        worker_running: false,
        batch_size: 5,
        poll_interval: Duration::from_secs(5),
        cors_origins,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    Server {
        _temp: temp,
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
    }
}

impl Server {
    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let body: Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_run_and_read_events() {
    let server = start().await;
    let project: Value = server
        .post("/projects", json!({ "name": "demo", "local_path": "/tmp/demo" }))
        .await
        .json()
        .await
        .unwrap();

    let response = server
        .post("/runs", json!({ "goal": "Test", "project_id": project["id"] }))
        .await;
    assert_eq!(response.status(), 201);
    let run: Value = response.json().await.unwrap();
    assert_eq!(run["status"], "QUEUED");
    let run_id = run["id"].as_str().unwrap().to_string();

    let events: Value = server
        .get(&format!("/runs/{run_id}/events"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(events[0]["type"], "RUN_CREATED");
    assert_eq!(events[0]["payload"], "Test");

    let directive = server
        .post(&format!("/runs/{run_id}/directive"), json!({ "text": "Do something" }))
        .await;
    assert_eq!(directive.status(), 201);
    let directive: Value = directive.json().await.unwrap();
    assert_eq!(directive["type"], "DIRECTIVE");
    assert_eq!(directive["run_id"], run_id.as_str());

    let after = events[0]["id"].as_i64().unwrap();
    let suffix: Value = server
        .get(&format!("/runs/{run_id}/events?after_id={after}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(suffix.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_mapping() {
    let server = start().await;
    let missing = uuid::Uuid::new_v4();

    let response = server.get(&format!("/runs/{missing}")).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().to_lowercase().contains("not found"));

    let response = server
        .post("/runs", json!({ "goal": "x", "options": { "provider": "nope" } }))
        .await;
    assert_eq!(response.status(), 400);

    let run: Value = server
        .post("/runs", json!({ "goal": "control" }))
        .await
        .json()
        .await
        .unwrap();
    let run_id = run["id"].as_str().unwrap();

    let response = server.post(&format!("/runs/{run_id}/pause"), json!({})).await;
    assert_eq!(response.status(), 409);

    let response = server
        .post(&format!("/runs/{run_id}/invalid_action"), json!({}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Invalid action"));

    let response = server.post(&format!("/runs/{run_id}/stop"), json!({})).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "STOPPED");
}

#[tokio::test]
async fn test_stream_honors_last_event_id() {
    let server = start().await;
    let run: Value = server
        .post("/runs", json!({ "goal": "stream me" }))
        .await
        .json()
        .await
        .unwrap();
    let run_id = run["id"].as_str().unwrap();

    let directive: Value = server
        .post(&format!("/runs/{run_id}/directive"), json!({ "text": "next" }))
        .await
        .json()
        .await
        .unwrap();
    let created_id = directive["id"].as_i64().unwrap() - 1;

    let mut response = server
        .client
        .get(format!("{}/runs/{run_id}/stream", server.base))
        .header("Last-Event-ID", created_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let mut body = String::new();
    while !body.contains("event: DIRECTIVE") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        body.push_str(&String::from_utf8_lossy(&chunk));
    }

    assert!(!body.contains("event: RUN_CREATED"));
    assert!(body.contains(&format!("id: {}", created_id + 1)));
}

#[tokio::test]
async fn test_listings() {
    let server = start().await;

    let workflows: Value = server.get("/workflows").await.json().await.unwrap();
    assert_eq!(workflows[0]["name"], "quarkus-bootstrap-v1");
    assert_eq!(workflows[0]["steps"], json!(["planner", "coder", "maven_test"]));

    let providers: Value = server.get("/providers").await.json().await.unwrap();
    assert_eq!(providers[0]["name"], "canned");
    assert_eq!(providers[0]["healthy"], true);

    let status: Value = server.get("/worker/status").await.json().await.unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["check_interval"], 5);
}

#[tokio::test]
async fn test_cors_allow_list() {
    let server = start_with_origins(vec!["https://console.example".to_string()]).await;
    let origin = |response: &reqwest::Response| {
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    };

    let allowed = server
        .client
        .get(format!("{}/health", server.base))
        .header("Origin", "https://console.example")
        .send()
        .await
        .unwrap();
    assert_eq!(origin(&allowed).as_deref(), Some("https://console.example"));

    let denied = server
        .client
        .get(format!("{}/health", server.base))
        .header("Origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(origin(&denied), None);

    let open = start().await;
    let any = open
        .client
        .get(format!("{}/health", open.base))
        .header("Origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(origin(&any).as_deref(), Some("*"));
}
