//! Scholar Orchestrator
//!
//! Generates academic modules: plans a topic, runs the generation steps for
//! each module, and serves progress over HTTP and WebSocket.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod image_tool;
pub mod pipeline;
pub mod pipeline_state;
pub mod placeholder;
pub mod prompts;
pub mod runs;
pub mod steps;
pub mod types;
pub mod websocket;

pub use api::{
    create_router, AppState, ErrorResponse, HealthResponse, StartRunRequest, StartRunResponse,
};
pub use audio::{normalize_audio, AudioError};
pub use config::{Config, GatewayConfig, GenerationMode, ModelConfig, CONFIG_FILE_NAME};
pub use error::{GenerationStep, Result, ScholarError};
pub use image_tool::{ImageTool, ImageToolOutcome, ImageToolRequest};
pub use pipeline::{Pipeline, ProgressReporter};
pub use pipeline_state::{
    InProgressModule, ModuleStage, PipelineState, RunStatus, RunSummary, StageFailure,
};
pub use placeholder::{substitute_image_placeholder, Substitution, IMAGE_PLACEHOLDER};
pub use runs::RunRegistry;
pub use types::{
    AudioScript, GeneratedImage, GeneratedModuleRecord, InteractiveContent, ModuleIdea,
    ModulePlan, PlannedModule, SynthesizedAudio, Topic,
};
pub use websocket::{EventBroadcaster, PipelineEvent};
