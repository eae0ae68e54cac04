//! Scholar Run Export
//!
//! Turns a finished [`PipelineState`] into files on disk: a JSON manifest for
//! programs, a Markdown summary for people, and one HTML document, image
//! and audio file per generated module.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON manifest
//! - [`MarkdownGenerator`] - Human-readable summary
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use scholar_orchestrator::{GenerationMode, PipelineState, Topic};
//! use scholar_report::RunExport;
//!
//! let state = PipelineState::new("run-1", Topic::new("Tides").unwrap(), GenerationMode::Single);
//! let export = RunExport::from_state(&state);
//! let written = export.write_to_dir(Path::new("scholar-output/run-1")).unwrap();
//! println!("wrote {} files", written.len());
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use scholar_gateway::DataUri;
use scholar_orchestrator::{
    GenerationMode, GeneratedModuleRecord, ModulePlan, PipelineState, RunStatus, StageFailure,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the JSON manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// File name of the Markdown summary.
pub const SUMMARY_FILE_NAME: &str = "README.md";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while exporting a run.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the manifest.
    #[error("failed to serialize manifest: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write export files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Export Types
// ============================================================================

/// High-level summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    /// Terminal (or current) status of the run.
    pub status: RunStatus,
    /// Number of modules generated.
    pub modules_completed: usize,
    /// Number of modules the run set out to generate, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_planned: Option<usize>,
    /// Wall-clock duration of the run.
    pub duration_seconds: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run last changed.
    pub finished_at: DateTime<Utc>,
}

/// Relative paths of a module's artifact files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFiles {
    /// Interactive HTML document.
    pub content: String,
    /// Illustration.
    pub image: String,
    /// Narration audio.
    pub audio: String,
}

/// One generated module in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleExport {
    /// Position in the run, starting at 0.
    pub index: usize,
    /// Title from the plan.
    pub planned_title: String,
    /// Concept from the plan.
    pub concept: String,
    /// Title from the module idea.
    pub module_title: String,
    /// Prompt the illustration was generated from.
    pub image_prompt: String,
    /// Narration concept from the module idea.
    pub animation_concept: String,
    /// Style keywords.
    pub keywords: Vec<String>,
    /// Narration text.
    pub script: String,
    /// Media type of the illustration.
    pub image_type: String,
    /// Media type of the narration audio.
    pub audio_type: String,
    /// Artifact files, relative to the export directory.
    pub files: ModuleFiles,
}

/// What a failed module had produced before it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialModuleExport {
    /// Position in the run.
    pub index: usize,
    /// Title from the plan.
    pub planned_title: String,
    /// Title from the idea, if the idea step finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_title: Option<String>,
    /// Narration text, if the script step finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// Binary payloads of a module, written next to the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModuleArtifacts {
    files: ModuleFiles,
    html: String,
    image: DataUri,
    audio: DataUri,
}

/// A run prepared for export.
///
/// The manifest part serializes without inline payloads; artifacts are
/// only written by [`RunExport::write_to_dir`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunExport {
    /// Run identifier.
    pub run_id: String,
    /// The submitted topic.
    pub topic: String,
    /// Single or multi-module.
    pub mode: GenerationMode,
    /// High-level summary.
    pub summary: ExportSummary,
    /// The module plan, for multi-module runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ModulePlan>,
    /// Generated modules in order.
    pub modules: Vec<ModuleExport>,
    /// The failure that ended the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// Artifacts of the module that failed, if it produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_module: Option<PartialModuleExport>,
    #[serde(skip)]
    artifacts: Vec<ModuleArtifacts>,
}

impl RunExport {
    /// Builds an export from a run's state.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::{GenerationMode, PipelineState, RunStatus, Topic};
    /// use scholar_report::RunExport;
    ///
    /// let state = PipelineState::new("run-1", Topic::new("Tides").unwrap(), GenerationMode::Multi);
    /// let export = RunExport::from_state(&state);
    /// assert_eq!(export.summary.status, RunStatus::Pending);
    /// assert!(export.modules.is_empty());
    /// ```
    #[must_use]
    pub fn from_state(state: &PipelineState) -> Self {
        let (modules, artifacts) = state.modules.iter().map(export_module).unzip();

        let failed_module = state
            .failure
            .as_ref()
            .and(state.in_progress.as_ref())
            .map(|partial| PartialModuleExport {
                index: partial.index,
                planned_title: partial.planned.title.clone(),
                module_title: partial.idea.as_ref().map(|i| i.module_title.clone()),
                script: partial.script.as_ref().map(|s| s.audio_script.clone()),
            });

        let duration = state.updated_at - state.started_at;
        Self {
            run_id: state.run_id.clone(),
            topic: state.topic.to_string(),
            mode: state.mode,
            summary: ExportSummary {
                status: state.status,
                modules_completed: state.modules.len(),
                modules_planned: state.total_modules(),
                duration_seconds: u64::try_from(duration.num_seconds()).unwrap_or(0),
                started_at: state.started_at,
                finished_at: state.updated_at,
            },
            plan: state.plan.clone(),
            modules,
            failure: state.failure.clone(),
            failed_module,
            artifacts,
        }
    }

    /// Writes the manifest, the summary and every module artifact into `dir`.
    ///
    /// The directory is created if needed. Existing files with the same
    /// names are overwritten. Returns the paths written, manifest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if a file cannot be written.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(2 + self.artifacts.len() * 3);

        let manifest = dir.join(MANIFEST_FILE_NAME);
        json::JsonGenerator::new(self).write_to_file(&manifest, true)?;
        written.push(manifest);

        let summary = dir.join(SUMMARY_FILE_NAME);
        fs::write(&summary, MarkdownGenerator::new(self).generate())?;
        written.push(summary);

        for artifact in &self.artifacts {
            let files = [
                (&artifact.files.content, artifact.html.as_bytes()),
                (&artifact.files.image, artifact.image.data()),
                (&artifact.files.audio, artifact.audio.data()),
            ];
            for (name, bytes) in files {
                let path = dir.join(name);
                fs::write(&path, bytes)?;
                debug!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
                written.push(path);
            }
        }

        info!(dir = %dir.display(), files = written.len(), "Run exported");
        Ok(written)
    }

    /// Returns `true` if the run completed every module.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.summary.status == RunStatus::Completed
    }
}

fn export_module(record: &GeneratedModuleRecord) -> (ModuleExport, ModuleArtifacts) {
    let stem = format!("module-{:02}", record.index + 1);
    let image = &record.image.image_data_uri;
    let audio = &record.audio.audio_data_uri;
    let files = ModuleFiles {
        content: format!("{stem}.html"),
        image: format!("{stem}.{}", extension_for(&image.essence())),
        audio: format!("{stem}.{}", extension_for(&audio.essence())),
    };

    let export = ModuleExport {
        index: record.index,
        planned_title: record.planned.title.clone(),
        concept: record.planned.concept.clone(),
        module_title: record.idea.module_title.clone(),
        image_prompt: record.idea.image_prompt.clone(),
        animation_concept: record.idea.animation_concept.clone(),
        keywords: record.idea.suggested_keywords.clone(),
        script: record.script.audio_script.clone(),
        image_type: image.media_type().to_string(),
        audio_type: audio.media_type().to_string(),
        files: files.clone(),
    };
    let artifacts = ModuleArtifacts {
        files,
        html: record.content.html_content.clone(),
        image: image.clone(),
        audio: audio.clone(),
    };
    (export, artifacts)
}

/// File extension for a media type essence.
///
/// # Examples
///
/// ```
/// use scholar_report::extension_for;
///
/// assert_eq!(extension_for("image/jpeg"), "jpg");
/// assert_eq!(extension_for("audio/wav"), "wav");
/// assert_eq!(extension_for("application/x-unknown"), "bin");
/// ```
#[must_use]
pub fn extension_for(essence: &str) -> &'static str {
    match essence {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/aac" => "aac",
        _ => "bin",
    }
}

// ============================================================================
// Tests
// ============================================================================
