//! Error types for the Scholar orchestrator.
//!
//! This module defines the error hierarchy for all orchestrator operations:
//! configuration loading, topic validation, the individual generation steps,
//! and the pipeline state machine.

use std::path::PathBuf;

use scholar_gateway::GatewayError;
use serde::{Deserialize, Serialize};

/// A specialized `Result` type for Scholar orchestrator operations.
pub type Result<T> = std::result::Result<T, ScholarError>;

/// The generation step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStep {
    /// Topic breakdown into modules.
    Plan,
    /// Module title, image prompt and narration concept.
    Idea,
    /// Illustration.
    Image,
    /// Transparency pass over an illustration.
    BackgroundRemoval,
    /// Interactive HTML document.
    Content,
    /// Narration script.
    Script,
    /// Synthesized narration audio.
    Speech,
}

impl std::fmt::Display for GenerationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Idea => write!(f, "idea"),
            Self::Image => write!(f, "image"),
            Self::BackgroundRemoval => write!(f, "background_removal"),
            Self::Content => write!(f, "content"),
            Self::Script => write!(f, "script"),
            Self::Speech => write!(f, "speech"),
        }
    }
}

/// Errors that can occur while generating academic modules.
///
/// Each generation step has its own variant so callers can tell which stage
/// failed. Gateway failures are kept as the error source.
#[derive(Debug, thiserror::Error)]
pub enum ScholarError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your scholar.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// The topic was empty or whitespace.
    #[error("Topic must not be empty\n\nSuggestion: Enter an academic topic such as 'Photosynthesis'")]
    EmptyTopic,

    /// The image prompt was empty or whitespace.
    #[error("Image prompt must not be empty\n\nSuggestion: Describe the image you want to generate")]
    EmptyPrompt,

    // ========================================================================
    // Generation Step Errors
    // ========================================================================
    /// The plan step produced no usable plan.
    #[error("Plan generation failed: {message}")]
    PlanGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The idea step produced no usable idea.
    #[error("Idea generation failed: {message}")]
    IdeaGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The image step returned no image.
    #[error("Image generation failed: {message}")]
    ImageGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The background-removal step returned no image.
    #[error("Background removal failed: {message}")]
    BackgroundRemoval {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The content step returned no document.
    #[error("Content generation failed: {message}")]
    ContentGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The script step returned no narration.
    #[error("Script generation failed: {message}")]
    ScriptGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    /// The speech step returned no playable audio.
    #[error("Speech generation failed: {message}")]
    SpeechGeneration {
        /// What was missing or invalid.
        message: String,
        /// Underlying gateway failure, if any.
        #[source]
        source: Option<GatewayError>,
    },

    // ========================================================================
    // Gateway Errors
    // ========================================================================
    /// The model gateway could not be set up.
    #[error("Model gateway error: {0}\n\nSuggestion: {suggestion}", suggestion = gateway_suggestion(.0))]
    Gateway(#[from] GatewayError),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },
}

fn gateway_suggestion(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::MissingApiKey { .. } => "Export your Gemini API key before starting Scholar",
        GatewayError::Request { kind, .. } => kind.suggestion(),
        _ => "Check the gateway section of your scholar.json",
    }
}

impl ScholarError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates the error variant belonging to `step`.
    #[must_use]
    pub fn step(step: GenerationStep, message: impl Into<String>) -> Self {
        Self::step_with_source(step, message, None)
    }

    /// Creates the error variant belonging to `step`, wrapping a gateway failure.
    ///
    /// The gateway error's message is appended to `context` so the cause
    /// stays visible when only the display form is shown.
    #[must_use]
    pub fn step_failed(step: GenerationStep, context: &str, source: GatewayError) -> Self {
        let message = format!("{context}: {source}");
        Self::step_with_source(step, message, Some(source))
    }

    fn step_with_source(
        step: GenerationStep,
        message: impl Into<String>,
        source: Option<GatewayError>,
    ) -> Self {
        let message = message.into();
        match step {
            GenerationStep::Plan => Self::PlanGeneration { message, source },
            GenerationStep::Idea => Self::IdeaGeneration { message, source },
            GenerationStep::Image => Self::ImageGeneration { message, source },
            GenerationStep::BackgroundRemoval => Self::BackgroundRemoval { message, source },
            GenerationStep::Content => Self::ContentGeneration { message, source },
            GenerationStep::Script => Self::ScriptGeneration { message, source },
            GenerationStep::Speech => Self::SpeechGeneration { message, source },
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns the generation step that produced this error, if any.
    #[must_use]
    pub const fn generation_step(&self) -> Option<GenerationStep> {
        match self {
            Self::PlanGeneration { .. } => Some(GenerationStep::Plan),
            Self::IdeaGeneration { .. } => Some(GenerationStep::Idea),
            Self::ImageGeneration { .. } => Some(GenerationStep::Image),
            Self::BackgroundRemoval { .. } => Some(GenerationStep::BackgroundRemoval),
            Self::ContentGeneration { .. } => Some(GenerationStep::Content),
            Self::ScriptGeneration { .. } => Some(GenerationStep::Script),
            Self::SpeechGeneration { .. } => Some(GenerationStep::Speech),
            _ => None,
        }
    }

    /// Returns the step message without the variant prefix.
    #[must_use]
    pub fn step_message(&self) -> Option<&str> {
        match self {
            Self::PlanGeneration { message, .. }
            | Self::IdeaGeneration { message, .. }
            | Self::ImageGeneration { message, .. }
            | Self::BackgroundRemoval { message, .. }
            | Self::ContentGeneration { message, .. }
            | Self::ScriptGeneration { message, .. }
            | Self::SpeechGeneration { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ScholarError::config_validation("maxModules must be at least 1", "Set it to 3");
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("maxModules"));
        assert!(msg.contains("Suggestion: Set it to 3"));
    }

    #[test]
    fn test_step_constructor_picks_variant() {
        let err = ScholarError::step(GenerationStep::Image, "no image returned");
        assert!(matches!(err, ScholarError::ImageGeneration { .. }));
        assert_eq!(err.generation_step(), Some(GenerationStep::Image));
        assert_eq!(err.step_message(), Some("no image returned"));
        assert_eq!(err.to_string(), "Image generation failed: no image returned");

        let err = ScholarError::step(GenerationStep::BackgroundRemoval, "x");
        assert!(matches!(err, ScholarError::BackgroundRemoval { .. }));
    }

    #[test]
    fn test_step_failed_preserves_source() {
        let cause = GatewayError::fetch("https://media.test/a.mp3", "HTTP 404");
        let err = ScholarError::step_failed(GenerationStep::Speech, "failed to fetch audio", cause);

        assert!(err.to_string().contains("failed to fetch audio"));
        assert!(err.to_string().contains("HTTP 404"));
        let source = err.source().unwrap();
        assert!(source.to_string().contains("media.test"));
    }

    #[test]
    fn test_generation_step_display() {
        assert_eq!(GenerationStep::BackgroundRemoval.to_string(), "background_removal");
        assert_eq!(GenerationStep::Plan.to_string(), "plan");
    }

    #[test]
    fn test_gateway_error_has_suggestion() {
        let err = ScholarError::from(GatewayError::MissingApiKey {
            env_var: "GEMINI_API_KEY".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains("GEMINI_API_KEY"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScholarError = io_err.into();
        assert!(matches!(err, ScholarError::Io(_)));
    }
}
