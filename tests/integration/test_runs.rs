//! Integration tests for the run lifecycle over HTTP.
//!
//! Each test serves the real router on a local port with a scripted model
//! gateway, drives it with an HTTP client, and checks what a caller would
//! observe.

use std::sync::Arc;
use std::time::Duration;

use scholar_gateway::{Media, ModelGateway, ScriptedGateway};
use scholar_orchestrator::{
    create_router, AppState, Config, HealthResponse, ImageToolOutcome, PipelineState, RunStatus,
    RunSummary, StartRunResponse, IMAGE_PLACEHOLDER,
};
use scholar_report::RunExport;
use serde_json::json;
use tokio::time::{sleep, timeout};

/// Spawns the server on an ephemeral port and returns its base URL.
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

    format!("http://{addr}")
}

fn push_idea(gateway: &ScriptedGateway, title: &str) {
    let models = Config::default().models;
    gateway.push_json(
        &models.text,
        &json!({
            "moduleTitle": title,
            "imagePrompt": format!("An illustration of {title}"),
            "animationConcept": format!("How {title} works."),
            "suggestedKeywords": ["reveal", "glow"]
        }),
    );
}

/// Scripts every call of one module after the idea.
fn push_rest_of_module(gateway: &ScriptedGateway, title: &str) {
    let models = Config::default().models;
    gateway.push_image(&models.image, "image/png", vec![0x89, b'P', b'N', b'G']);
    gateway.push_json(
        &models.text,
        &json!({ "htmlContent": format!("<h1>{title}</h1><img src=\"{IMAGE_PLACEHOLDER}\">") }),
    );
    gateway.push_text(&models.text, format!("Narration for {title}."));
    gateway.push_media(&models.speech, Media::inline("audio/mpeg", b"ID3".to_vec()));
}

fn push_plan(gateway: &ScriptedGateway, titles: &[&str]) {
    let models = Config::default().models;
    let modules: Vec<_> = titles
        .iter()
        .map(|title| json!({ "title": title, "concept": format!("About {title}.") }))
        .collect();
    gateway.push_json(
        &models.text,
        &json!({ "overallTopic": "Photosynthesis", "plannedModules": modules }),
    );
}

async fn start_run(client: &reqwest::Client, base: &str, body: serde_json::Value) -> String {
    let response = client
        .post(format!("{base}/api/modules"))
        .json(&body)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let started: StartRunResponse = response.json().await.expect("Invalid response body");
    started.run_id
}

/// Polls a run until it reaches a terminal status.
async fn wait_for_run(client: &reqwest::Client, base: &str, run_id: &str) -> PipelineState {
    timeout(Duration::from_secs(5), async {
        loop {
            let state: PipelineState = client
                .get(format!("{base}/api/runs/{run_id}"))
                .send()
                .await
                .expect("Request failed")
                .json()
                .await
                .expect("Invalid run state");
            if state.is_terminal() {
                return state;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Run did not finish in time")
}

// ============================================================================
// Run Lifecycle
// ============================================================================

#[tokio::test]
async fn test_multi_module_run_completes_and_serves_content() {
    let gateway = Arc::new(ScriptedGateway::new());
    push_plan(&gateway, &["Intro", "Light Reactions"]);
    push_idea(&gateway, "Sunlight Kitchen");
    push_rest_of_module(&gateway, "Sunlight Kitchen");
    push_idea(&gateway, "Day Shift");
    push_rest_of_module(&gateway, "Day Shift");

    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let run_id = start_run(
        &client,
        &base,
        json!({ "topic": "Photosynthesis", "mode": "multi" }),
    )
    .await;
    let state = wait_for_run(&client, &base, &run_id).await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.modules.len(), 2);
    assert_eq!(state.modules[1].idea.module_title, "Day Shift");
    assert_eq!(state.plan.as_ref().map(|p| p.len()), Some(2));

    let html = client
        .get(format!("{base}/api/runs/{run_id}/modules/0/content"))
        .send()
        .await
        .expect("Request failed")
        .text()
        .await
        .expect("Invalid body");
    assert!(html.contains("<h1>Sunlight Kitchen</h1>"));
    assert!(html.contains("data:image/png;base64,"));
    assert!(!html.contains(IMAGE_PLACEHOLDER));

    let runs: Vec<RunSummary> = client
        .get(format!("{base}/api/runs"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid run list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].modules_completed, 2);
    assert_eq!(gateway.pending(), 0);
}

#[tokio::test]
async fn test_single_mode_skips_planning() {
    let gateway = Arc::new(ScriptedGateway::new());
    push_idea(&gateway, "Tides Explained");
    push_rest_of_module(&gateway, "Tides Explained");

    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let run_id = start_run(&client, &base, json!({ "topic": "Tides", "mode": "single" })).await;
    let state = wait_for_run(&client, &base, &run_id).await;

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.plan.is_none());
    assert_eq!(state.modules.len(), 1);
    assert_eq!(state.modules[0].planned.title, "Tides");
}

#[tokio::test]
async fn test_failed_run_reports_step_and_keeps_finished_modules() {
    let gateway = Arc::new(ScriptedGateway::new());
    push_plan(&gateway, &["One", "Two"]);
    push_idea(&gateway, "One");
    push_rest_of_module(&gateway, "One");
    push_idea(&gateway, "Two");
    gateway.push_empty(&Config::default().models.image);

    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let run_id = start_run(&client, &base, json!({ "topic": "Photosynthesis" })).await;
    let state = wait_for_run(&client, &base, &run_id).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.modules.len(), 1);
    let failure = state.failure.as_ref().expect("Failure recorded");
    assert_eq!(failure.module_index, Some(1));
    assert!(state.stage_label().starts_with("Failed at image for module 2"));

    let response = client
        .get(format!("{base}/api/runs/{run_id}/modules/1/content"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_finished_run_exports_to_directory() {
    let gateway = Arc::new(ScriptedGateway::new());
    push_idea(&gateway, "Tides Explained");
    push_rest_of_module(&gateway, "Tides Explained");

    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();
    let run_id = start_run(&client, &base, json!({ "topic": "Tides", "mode": "single" })).await;
    let state = wait_for_run(&client, &base, &run_id).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let written = RunExport::from_state(&state)
        .write_to_dir(dir.path())
        .expect("Export failed");

    assert_eq!(written.len(), 5);
    assert!(dir.path().join("manifest.json").exists());
    assert!(dir.path().join("module-01.mp3").exists());
    let html = std::fs::read_to_string(dir.path().join("module-01.html")).expect("Missing html");
    assert!(html.contains("Tides Explained"));
}

// ============================================================================
// Request Validation
// ============================================================================

#[tokio::test]
async fn test_blank_topic_is_rejected() {
    let gateway = Arc::new(ScriptedGateway::new());
    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/modules"))
        .json(&json!({ "topic": "   " }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("Invalid error body");
    assert!(body["error"].as_str().is_some());
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let gateway = Arc::new(ScriptedGateway::new());
    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/api/runs/run-missing"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_counts_no_active_runs_when_idle() {
    let gateway = Arc::new(ScriptedGateway::new());
    let base = spawn_test_server(&gateway).await;

    let health: HealthResponse = reqwest::get(format!("{base}/api/health"))
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid health body");
    assert_eq!(health.status, "ok");
    assert_eq!(health.active_runs, 0);
}

// ============================================================================
// Image Tool
// ============================================================================

#[tokio::test]
async fn test_image_endpoint_reports_background_failure() {
    let gateway = Arc::new(ScriptedGateway::new());
    let models = Config::default().models;
    gateway.push_image(&models.image, "image/png", vec![0x89, b'P', b'N', b'G']);
    gateway.push_text(&models.background_removal, "no image here");

    let base = spawn_test_server(&gateway).await;
    let client = reqwest::Client::new();

    let outcome: ImageToolOutcome = client
        .post(format!("{base}/api/images"))
        .json(&json!({ "prompt": "A red fox", "removeBackground": true }))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid outcome");

    assert!(outcome.processed_image.is_none());
    assert!(outcome.background_error.is_some());
    assert!(outcome.download_file_name.starts_with("gemini_alchemist_A_red_fox_"));
}
