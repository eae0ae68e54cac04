//! Integration tests for WebSocket progress streaming.
//!
//! These tests validate the connected snapshot, the ordering of run events,
//! and delivery to several clients at once.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use scholar_gateway::{Media, ModelGateway, ScriptedGateway};
use scholar_orchestrator::{
    create_router, AppState, Config, ModuleStage, PipelineEvent, RunStatus,
};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns the test server and returns its address.
async fn spawn_test_server(gateway: &Arc<ScriptedGateway>) -> String {
    let gateway: Arc<dyn ModelGateway> = gateway.clone();
    let router = create_router(AppState::new(Config::default(), gateway));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    addr.to_string()
}

/// Connects a WebSocket client to the server.
async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message and parses it as a `PipelineEvent`.
/// Answers pings while waiting.
async fn receive_event(client: &mut WsClient) -> PipelineEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Collects events until `run_complete`, inclusive.
async fn receive_until_complete(client: &mut WsClient) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    loop {
        let event = receive_event(client).await;
        let done = matches!(event, PipelineEvent::RunComplete(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

fn script_single_module(gateway: &ScriptedGateway) {
    let models = Config::default().models;
    gateway.push_json(
        &models.text,
        &json!({
            "moduleTitle": "Tides Explained",
            "imagePrompt": "The moon pulling the ocean",
            "animationConcept": "Water follows the moon.",
            "suggestedKeywords": ["pulse"]
        }),
    );
    gateway.push_image(&models.image, "image/png", vec![0x89, b'P', b'N', b'G']);
    gateway.push_json(&models.text, &json!({ "htmlContent": "<h1>Tides</h1>" }));
    gateway.push_text(&models.text, "Welcome to tides.");
    gateway.push_media(&models.speech, Media::inline("audio/mpeg", b"ID3".to_vec()));
}

async fn start_single_run(addr: &str, topic: &str) -> String {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/modules"))
        .json(&json!({ "topic": topic, "mode": "single" }))
        .send()
        .await
        .expect("Request failed");
    let body: serde_json::Value = response.json().await.expect("Invalid response body");
    body["runId"].as_str().expect("Missing runId").to_string()
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let gateway = Arc::new(ScriptedGateway::new());
    let addr = spawn_test_server(&gateway).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    match event {
        PipelineEvent::Connected(payload) => assert!(payload.runs.is_empty()),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_connected_event_lists_finished_runs() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_single_module(&gateway);
    let addr = spawn_test_server(&gateway).await;

    // Watch the run finish on one client, then connect a second.
    let mut watcher = connect_client(&addr).await;
    receive_event(&mut watcher).await;
    let run_id = start_single_run(&addr, "Tides").await;
    receive_until_complete(&mut watcher).await;

    let mut late = connect_client(&addr).await;
    match receive_event(&mut late).await {
        PipelineEvent::Connected(payload) => {
            assert_eq!(payload.runs.len(), 1);
            assert_eq!(payload.runs[0].run_id, run_id);
            assert_eq!(payload.runs[0].status, RunStatus::Completed);
            assert_eq!(payload.runs[0].modules_completed, 1);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

// ============================================================================
// Event Ordering
// ============================================================================

#[tokio::test]
async fn test_single_run_event_sequence() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_single_module(&gateway);
    let addr = spawn_test_server(&gateway).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    let run_id = start_single_run(&addr, "Tides").await;
    let events = receive_until_complete(&mut client).await;

    let names: Vec<&str> = events.iter().map(PipelineEvent::event_name).collect();
    assert_eq!(
        names,
        vec![
            "run_started",
            "stage_started",
            "stage_started",
            "stage_started",
            "stage_started",
            "stage_started",
            "module_completed",
            "run_complete",
        ]
    );
    assert!(events.iter().all(|e| e.run_id() == Some(run_id.as_str())));

    let stages: Vec<ModuleStage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageStarted(p) => Some(p.stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            ModuleStage::Idea,
            ModuleStage::Image,
            ModuleStage::Content,
            ModuleStage::Script,
            ModuleStage::Speech,
        ]
    );

    match events.last() {
        Some(PipelineEvent::RunComplete(payload)) => {
            assert_eq!(payload.status, RunStatus::Completed);
            assert_eq!(payload.modules_completed, 1);
        }
        other => panic!("Expected RunComplete, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_run_sends_error_before_completion() {
    let gateway = Arc::new(ScriptedGateway::new());
    let models = Config::default().models;
    gateway.push_text(&models.text, "this is not JSON");
    let addr = spawn_test_server(&gateway).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    start_single_run(&addr, "Tides").await;
    let events = receive_until_complete(&mut client).await;

    let names: Vec<&str> = events.iter().map(PipelineEvent::event_name).collect();
    assert_eq!(
        names,
        vec!["run_started", "stage_started", "error", "run_complete"]
    );
    match &events[2] {
        PipelineEvent::Error(payload) => {
            assert_eq!(payload.module_index, Some(0));
            assert!(!payload.message.is_empty());
        }
        other => panic!("Expected Error, got: {other:?}"),
    }
    match &events[3] {
        PipelineEvent::RunComplete(payload) => assert_eq!(payload.status, RunStatus::Failed),
        other => panic!("Expected RunComplete, got: {other:?}"),
    }
}

// ============================================================================
// Multiple Clients
// ============================================================================

#[tokio::test]
async fn test_every_client_receives_run_events() {
    let gateway = Arc::new(ScriptedGateway::new());
    script_single_module(&gateway);
    let addr = spawn_test_server(&gateway).await;

    let mut first = connect_client(&addr).await;
    let mut second = connect_client(&addr).await;
    receive_event(&mut first).await;
    receive_event(&mut second).await;

    start_single_run(&addr, "Tides").await;

    let first_events = receive_until_complete(&mut first).await;
    let second_events = receive_until_complete(&mut second).await;
    assert_eq!(first_events.len(), second_events.len());
    assert_eq!(first_events.len(), 8);
}
