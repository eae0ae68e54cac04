//! Data model for generated academic modules.
//!
//! Every value here is created fresh for a run and never mutated after it
//! has been handed on; later steps wrap earlier outputs rather than edit them.

use scholar_gateway::DataUri;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScholarError};

// ============================================================================
// Topic
// ============================================================================

/// A validated, non-empty academic topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ScholarError::EmptyTopic`] if nothing is left after trimming.
    pub fn new(topic: impl AsRef<str>) -> Result<Self> {
        let trimmed = topic.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ScholarError::EmptyTopic);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the topic text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Plan
// ============================================================================

/// One entry of a module plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedModule {
    /// Module title.
    pub title: String,
    /// Core concept in one or two sentences.
    pub concept: String,
}

impl PlannedModule {
    /// Creates a planned module.
    #[must_use]
    pub fn new(title: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            concept: concept.into(),
        }
    }
}

/// Ordered breakdown of a topic into modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePlan {
    /// The topic the plan covers.
    pub overall_topic: String,
    /// Modules in teaching order.
    pub planned_modules: Vec<PlannedModule>,
}

impl ModulePlan {
    /// Number of planned modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.planned_modules.len()
    }

    /// Returns `true` if the plan holds no modules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.planned_modules.is_empty()
    }
}

// ============================================================================
// Step Outputs
// ============================================================================

/// Title, illustration prompt and narration concept for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIdea {
    /// Short catchy module title.
    pub module_title: String,
    /// Prompt for a textless, colorful illustration.
    pub image_prompt: String,
    /// Concept the interactive document and narration explain.
    pub animation_concept: String,
    /// Two or three style keywords.
    pub suggested_keywords: Vec<String>,
}

/// An illustration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// The image as a base64 data URI.
    pub image_data_uri: DataUri,
}

/// A self-contained interactive HTML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveContent {
    /// Complete HTML with inline CSS and JavaScript.
    pub html_content: String,
}

/// Narration text for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioScript {
    /// The script, roughly 100 to 150 words.
    pub audio_script: String,
}

/// Playable narration audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedAudio {
    /// The audio as a base64 data URI in a containerized format.
    pub audio_data_uri: DataUri,
}

// ============================================================================
// GeneratedModuleRecord
// ============================================================================

/// Everything generated for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedModuleRecord {
    /// Position in the run, starting at 0.
    pub index: usize,
    /// The plan entry this module was generated from.
    pub planned: PlannedModule,
    /// Title, prompt and concept.
    pub idea: ModuleIdea,
    /// Illustration.
    pub image: GeneratedImage,
    /// Interactive document with the image substituted in.
    pub content: InteractiveContent,
    /// Narration script.
    pub script: AudioScript,
    /// Narration audio.
    pub audio: SynthesizedAudio,
}
