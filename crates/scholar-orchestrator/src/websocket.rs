//! WebSocket event types and broadcasting for real-time run observation.
//!
//! Every pipeline run publishes its progress as events. Events are broadcast
//! to all connected clients; each payload carries the run id so a client can
//! follow one run or all of them.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, lists the known runs
//! - `run_started` - A run was accepted and started
//! - `plan_ready` - The module plan was generated
//! - `stage_started` - A module entered a generation stage
//! - `module_completed` - A module finished all of its stages
//! - `run_complete` - A run reached a terminal status
//! - `error` - A generation step failed
//!
//! # Example
//!
//! ```no_run
//! use scholar_orchestrator::websocket::{EventBroadcaster, PipelineEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(PipelineEvent::error(Some("run-1".to_string()), None, None, "boom"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::config::GenerationMode;
use crate::error::GenerationStep;
use crate::pipeline_state::{ModuleStage, RunStatus, RunSummary};
use crate::types::ModulePlan;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Every run the server knows about.
    pub runs: Vec<RunSummary>,
}

/// Payload for the `run_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedPayload {
    /// Run identifier.
    pub run_id: String,
    /// The submitted topic.
    pub topic: String,
    /// Single or multi-module.
    pub mode: GenerationMode,
    /// When the run started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `plan_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReadyPayload {
    /// Run identifier.
    pub run_id: String,
    /// The generated plan.
    pub plan: ModulePlan,
}

/// Payload for the `stage_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStartedPayload {
    /// Run identifier.
    pub run_id: String,
    /// Module being generated.
    pub module_index: usize,
    /// The stage that started.
    pub stage: ModuleStage,
    /// Human-readable progress label.
    pub label: String,
}

/// Payload for the `module_completed` event.
///
/// Carries titles only; artifacts are fetched over HTTP to keep events small.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCompletedPayload {
    /// Run identifier.
    pub run_id: String,
    /// Index of the finished module.
    pub module_index: usize,
    /// Title from the module idea.
    pub module_title: String,
}

/// Payload for the `run_complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompletePayload {
    /// Run identifier.
    pub run_id: String,
    /// The terminal status.
    pub status: RunStatus,
    /// Summary of the outcome.
    pub summary: String,
    /// Number of modules generated.
    pub modules_completed: usize,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Run the error belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Module being generated when the error occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_index: Option<usize>,
    /// The failing step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<GenerationStep>,
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for run observation.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when a run starts.
    RunStarted(RunStartedPayload),
    /// Sent when the plan is ready.
    PlanReady(PlanReadyPayload),
    /// Sent when a module enters a stage.
    StageStarted(StageStartedPayload),
    /// Sent when a module finishes.
    ModuleCompleted(ModuleCompletedPayload),
    /// Sent when a run terminates.
    RunComplete(RunCompletePayload),
    /// Sent when a step fails.
    Error(ErrorPayload),
}

impl PipelineEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(runs: Vec<RunSummary>) -> Self {
        Self::Connected(ConnectedPayload { runs })
    }

    /// Creates a `RunStarted` event.
    #[must_use]
    pub fn run_started(run_id: impl Into<String>, topic: impl Into<String>, mode: GenerationMode) -> Self {
        Self::RunStarted(RunStartedPayload {
            run_id: run_id.into(),
            topic: topic.into(),
            mode,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `PlanReady` event.
    #[must_use]
    pub fn plan_ready(run_id: impl Into<String>, plan: ModulePlan) -> Self {
        Self::PlanReady(PlanReadyPayload {
            run_id: run_id.into(),
            plan,
        })
    }

    /// Creates a `StageStarted` event.
    #[must_use]
    pub fn stage_started(
        run_id: impl Into<String>,
        module_index: usize,
        stage: ModuleStage,
        label: impl Into<String>,
    ) -> Self {
        Self::StageStarted(StageStartedPayload {
            run_id: run_id.into(),
            module_index,
            stage,
            label: label.into(),
        })
    }

    /// Creates a `ModuleCompleted` event.
    #[must_use]
    pub fn module_completed(
        run_id: impl Into<String>,
        module_index: usize,
        module_title: impl Into<String>,
    ) -> Self {
        Self::ModuleCompleted(ModuleCompletedPayload {
            run_id: run_id.into(),
            module_index,
            module_title: module_title.into(),
        })
    }

    /// Creates a `RunComplete` event.
    #[must_use]
    pub fn run_complete(
        run_id: impl Into<String>,
        status: RunStatus,
        summary: impl Into<String>,
        modules_completed: usize,
    ) -> Self {
        Self::RunComplete(RunCompletePayload {
            run_id: run_id.into(),
            status,
            summary: summary.into(),
            modules_completed,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(
        run_id: Option<String>,
        module_index: Option<usize>,
        step: Option<GenerationStep>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorPayload {
            run_id,
            module_index,
            step,
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::RunStarted(_) => "run_started",
            Self::PlanReady(_) => "plan_ready",
            Self::StageStarted(_) => "stage_started",
            Self::ModuleCompleted(_) => "module_completed",
            Self::RunComplete(_) => "run_complete",
            Self::Error(_) => "error",
        }
    }

    /// Returns the run the event belongs to, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Connected(_) => None,
            Self::RunStarted(p) => Some(&p.run_id),
            Self::PlanReady(p) => Some(&p.run_id),
            Self::StageStarted(p) => Some(&p.run_id),
            Self::ModuleCompleted(p) => Some(&p.run_id),
            Self::RunComplete(p) => Some(&p.run_id),
            Self::Error(p) => p.run_id.as_deref(),
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts pipeline events to all connected WebSocket clients.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all connected subscribers.
    ///
    /// Returns the number of receivers that got the event; 0 means nobody
    /// is listening.
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the known runs immediately
/// - Forwards every broadcast event to the client
/// - Pings every 30 seconds and closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no event falls between the two.
    let mut event_receiver = state.broadcaster.subscribe();

    let connected = PipelineEvent::connected(state.runs.summaries().await);
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent run list");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it so the first ping waits
    // a full interval.
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(pipeline_event) => {
                        let json = match serde_json::to_string(&pipeline_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::PlannedModule;

    // ------------------------------------------------------------------------
    // Event Serialization Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_connected_event_serialization() {
        let event = PipelineEvent::connected(Vec::new());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"connected""#));
        assert!(json.contains(r#""runs":[]"#));
    }

    #[test]
    fn test_run_started_event_serialization() {
        let event = PipelineEvent::run_started("run-1", "Photosynthesis", GenerationMode::Multi);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"run_started""#));
        assert!(json.contains(r#""runId":"run-1""#));
        assert!(json.contains(r#""mode":"multi""#));
        assert!(json.contains(r#""timestamp""#));
    }

    #[test]
    fn test_plan_ready_event_serialization() {
        let plan = ModulePlan {
            overall_topic: "Photosynthesis".to_string(),
            planned_modules: vec![PlannedModule::new("Intro", "Light to sugar.")],
        };
        let event = PipelineEvent::plan_ready("run-1", plan);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"plan_ready""#));
        assert!(json.contains(r#""overallTopic":"Photosynthesis""#));
    }

    #[test]
    fn test_stage_started_event_serialization() {
        let event =
            PipelineEvent::stage_started("run-1", 1, ModuleStage::Image, "Module 2 of 3: generating image");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"stage_started""#));
        assert!(json.contains(r#""moduleIndex":1"#));
        assert!(json.contains(r#""stage":"image""#));
    }

    #[test]
    fn test_run_complete_event_serialization() {
        let event = PipelineEvent::run_complete("run-1", RunStatus::Completed, "Completed 3 modules", 3);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"run_complete""#));
        assert!(json.contains(r#""status":"completed""#));
        assert!(json.contains(r#""modulesCompleted":3"#));
    }

    #[test]
    fn test_error_event_omits_missing_context() {
        let event = PipelineEvent::error(None, None, None, "Gateway unreachable");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"error""#));
        assert!(json.contains(r#""message":"Gateway unreachable""#));
        assert!(!json.contains("runId"));
        assert!(!json.contains("step"));
    }

    // ------------------------------------------------------------------------
    // Event Deserialization Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{"event":"error","payload":{"runId":"r","moduleIndex":2,"step":"speech","message":"no audio"}}"#;

        let event: PipelineEvent = serde_json::from_str(json).unwrap();
        let PipelineEvent::Error(payload) = event else {
            unreachable!("expected error event");
        };
        assert_eq!(payload.run_id.as_deref(), Some("r"));
        assert_eq!(payload.module_index, Some(2));
        assert_eq!(payload.step, Some(GenerationStep::Speech));
    }

    #[test]
    fn test_module_completed_event_deserialization() {
        let json = r#"{"event":"module_completed","payload":{"runId":"r","moduleIndex":0,"moduleTitle":"Sunlight Kitchen"}}"#;

        let event: PipelineEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_name(), "module_completed");
        assert_eq!(event.run_id(), Some("r"));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(PipelineEvent::connected(Vec::new()).event_name(), "connected");
        assert_eq!(
            PipelineEvent::run_started("r", "t", GenerationMode::Single).event_name(),
            "run_started"
        );
        assert_eq!(
            PipelineEvent::stage_started("r", 0, ModuleStage::Idea, "").event_name(),
            "stage_started"
        );
        assert_eq!(
            PipelineEvent::module_completed("r", 0, "").event_name(),
            "module_completed"
        );
        assert_eq!(
            PipelineEvent::run_complete("r", RunStatus::Failed, "", 0).event_name(),
            "run_complete"
        );
        assert_eq!(PipelineEvent::error(None, None, None, "").event_name(), "error");
    }

    // ------------------------------------------------------------------------
    // Broadcaster Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        let count = broadcaster.send(PipelineEvent::module_completed("r", 0, "Intro"));
        assert_eq!(count, 1);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, PipelineEvent::ModuleCompleted(_)));
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();

        assert_eq!(broadcaster.send(PipelineEvent::error(None, None, None, "x")), 2);
        assert!(matches!(receiver1.recv().await.unwrap(), PipelineEvent::Error(_)));
        assert!(matches!(receiver2.recv().await.unwrap(), PipelineEvent::Error(_)));
    }

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::default();
        assert_eq!(broadcaster.send(PipelineEvent::connected(Vec::new())), 0);
        assert_eq!(broadcaster.receiver_count(), 0);
    }
}
