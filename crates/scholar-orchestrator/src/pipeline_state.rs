//! Pipeline state types for the Scholar orchestrator.
//!
//! A [`PipelineState`] is the single explicit record of a run: it is created
//! when a run is submitted, moved through the pipeline, and published after
//! every transition. Nothing about a run's progress lives anywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GenerationMode;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::types::{
    AudioScript, GeneratedImage, GeneratedModuleRecord, InteractiveContent, ModuleIdea,
    ModulePlan, PlannedModule, Topic,
};

// ============================================================================
// ModuleStage
// ============================================================================

/// Stage of the module currently being generated.
///
/// The stage advances strictly in order:
/// `Idle` -> `Idea` -> `Image` -> `Content` -> `Script` -> `Speech` -> `Done`.
/// `Error` can be entered from any stage before `Done` and ends the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStage {
    /// No step has started yet.
    #[default]
    Idle,
    /// Generating the module idea.
    Idea,
    /// Generating the illustration.
    Image,
    /// Generating the interactive document.
    Content,
    /// Generating the narration script.
    Script,
    /// Synthesizing the narration audio.
    Speech,
    /// All steps finished.
    Done,
    /// A step failed.
    Error,
}

impl ModuleStage {
    /// Returns the stage that follows this one on success.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Idea),
            Self::Idea => Some(Self::Image),
            Self::Image => Some(Self::Content),
            Self::Content => Some(Self::Script),
            Self::Script => Some(Self::Speech),
            Self::Speech => Some(Self::Done),
            Self::Done | Self::Error => None,
        }
    }

    /// Returns `true` if no further transition is possible.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::ModuleStage;
    ///
    /// assert!(ModuleStage::Done.is_terminal());
    /// assert!(ModuleStage::Error.is_terminal());
    /// assert!(!ModuleStage::Image.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// The generation step a working stage runs, if any.
    #[must_use]
    pub const fn step(&self) -> Option<GenerationStep> {
        match self {
            Self::Idea => Some(GenerationStep::Idea),
            Self::Image => Some(GenerationStep::Image),
            Self::Content => Some(GenerationStep::Content),
            Self::Script => Some(GenerationStep::Script),
            Self::Speech => Some(GenerationStep::Speech),
            Self::Idle | Self::Done | Self::Error => None,
        }
    }

    /// Human-readable description of what the stage is doing.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "waiting to start",
            Self::Idea => "generating idea",
            Self::Image => "generating image",
            Self::Content => "generating interactive content",
            Self::Script => "writing narration script",
            Self::Speech => "synthesizing speech",
            Self::Done => "done",
            Self::Error => "failed",
        }
    }
}

impl std::fmt::Display for ModuleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Idea => write!(f, "idea"),
            Self::Image => write!(f, "image"),
            Self::Content => write!(f, "content"),
            Self::Script => write!(f, "script"),
            Self::Speech => write!(f, "speech"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// RunStatus
// ============================================================================

/// Overall status of a run.
///
/// `Pending` -> `Planning` (multi mode only) -> `Generating` ->
/// `Completed` | `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Submitted, not started.
    #[default]
    Pending,
    /// Running the plan step.
    Planning,
    /// Generating modules.
    Generating,
    /// Every module was generated.
    Completed,
    /// A step failed; see the recorded failure.
    Failed,
}

impl RunStatus {
    /// Returns `true` if this status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Planning => write!(f, "planning"),
            Self::Generating => write!(f, "generating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// StageFailure and InProgressModule
// ============================================================================

/// Where and why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    /// Module being generated, or `None` if planning failed.
    pub module_index: Option<usize>,
    /// The step that failed.
    pub step: GenerationStep,
    /// The step's error message.
    pub message: String,
}

/// Artifacts of the module currently being generated.
///
/// Kept on the state so that finished stages stay inspectable even when a
/// later stage of the same module fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressModule {
    /// Position in the run.
    pub index: usize,
    /// Plan entry being generated.
    pub planned: PlannedModule,
    /// Idea, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea: Option<ModuleIdea>,
    /// Illustration, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<GeneratedImage>,
    /// Interactive document, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<InteractiveContent>,
    /// Narration script, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<AudioScript>,
}

impl InProgressModule {
    fn new(index: usize, planned: PlannedModule) -> Self {
        Self {
            index,
            planned,
            idea: None,
            image: None,
            content: None,
            script: None,
        }
    }
}

// ============================================================================
// RunSummary
// ============================================================================

/// Compact view of a run for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: String,
    /// The submitted topic.
    pub topic: String,
    /// Single or multi-module.
    pub mode: GenerationMode,
    /// Current status.
    pub status: RunStatus,
    /// Current progress description.
    pub stage_label: String,
    /// Number of finished modules.
    pub modules_completed: usize,
    /// Number of modules the run will generate, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_modules: Option<usize>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run last changed.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// PipelineState
// ============================================================================

/// Complete state of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// Run identifier.
    pub run_id: String,
    /// The submitted topic.
    pub topic: Topic,
    /// Single or multi-module.
    pub mode: GenerationMode,
    /// Overall status.
    pub status: RunStatus,
    /// The module plan, once generated (multi mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ModulePlan>,
    /// Index of the module being generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_module: Option<usize>,
    /// Stage of the module being generated.
    pub stage: ModuleStage,
    /// Partial artifacts of the module being generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<InProgressModule>,
    /// Finished modules in order. Only ever appended to.
    pub modules: Vec<GeneratedModuleRecord>,
    /// The failure that ended the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the state was last updated.
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    /// Creates a new state in the `Pending` status.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::{GenerationMode, ModuleStage, PipelineState, RunStatus, Topic};
    ///
    /// let topic = Topic::new("Photosynthesis").unwrap();
    /// let state = PipelineState::new("run-1", topic, GenerationMode::Multi);
    /// assert_eq!(state.status, RunStatus::Pending);
    /// assert_eq!(state.stage, ModuleStage::Idle);
    /// assert!(state.modules.is_empty());
    /// ```
    #[must_use]
    pub fn new(run_id: impl Into<String>, topic: Topic, mode: GenerationMode) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            topic,
            mode,
            status: RunStatus::Pending,
            plan: None,
            current_module: None,
            stage: ModuleStage::Idle,
            in_progress: None,
            modules: Vec::new(),
            failure: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the run has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of modules the run will generate, once known.
    #[must_use]
    pub fn total_modules(&self) -> Option<usize> {
        match self.mode {
            GenerationMode::Single => Some(1),
            GenerationMode::Multi => self.plan.as_ref().map(ModulePlan::len),
        }
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Enters the planning phase.
    ///
    /// # Errors
    ///
    /// Fails unless the run is `Pending` in multi mode.
    pub fn start_planning(&mut self) -> Result<()> {
        if self.status != RunStatus::Pending || self.mode != GenerationMode::Multi {
            return Err(ScholarError::invalid_transition(self.status, RunStatus::Planning));
        }
        self.status = RunStatus::Planning;
        self.touch();
        Ok(())
    }

    /// Stores the plan and moves on to module generation.
    ///
    /// # Errors
    ///
    /// Fails unless the run is `Planning`.
    pub fn set_plan(&mut self, plan: ModulePlan) -> Result<()> {
        if self.status != RunStatus::Planning {
            return Err(ScholarError::invalid_transition(self.status, RunStatus::Generating));
        }
        self.plan = Some(plan);
        self.status = RunStatus::Generating;
        self.touch();
        Ok(())
    }

    /// Starts generating a module.
    ///
    /// # Errors
    ///
    /// Fails if the previous module is unfinished, if `index` skips ahead,
    /// or if the run is not ready to generate.
    pub fn begin_module(&mut self, index: usize, planned: PlannedModule) -> Result<()> {
        let ready = match self.mode {
            GenerationMode::Single => {
                matches!(self.status, RunStatus::Pending | RunStatus::Generating)
            }
            GenerationMode::Multi => self.status == RunStatus::Generating,
        };
        if !ready {
            return Err(ScholarError::invalid_transition(self.status, RunStatus::Generating));
        }
        if self.in_progress.is_some() || !matches!(self.stage, ModuleStage::Idle | ModuleStage::Done)
        {
            return Err(ScholarError::invalid_transition(
                self.stage,
                format!("module {index}"),
            ));
        }
        if index != self.modules.len() {
            return Err(ScholarError::invalid_transition(
                format!("module {}", self.modules.len()),
                format!("module {index}"),
            ));
        }

        self.status = RunStatus::Generating;
        self.current_module = Some(index);
        self.stage = ModuleStage::Idle;
        self.in_progress = Some(InProgressModule::new(index, planned));
        self.touch();
        Ok(())
    }

    /// Moves the current module to `to`, which must be the next stage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` for any out-of-order move.
    pub fn advance(&mut self, to: ModuleStage) -> Result<()> {
        if self.in_progress.is_none() || self.stage.next() != Some(to) || to == ModuleStage::Done {
            return Err(ScholarError::invalid_transition(self.stage, to));
        }
        self.stage = to;
        self.touch();
        Ok(())
    }

    fn in_progress_at(&mut self, stage: ModuleStage) -> Result<&mut InProgressModule> {
        if self.stage != stage {
            return Err(ScholarError::invalid_transition(self.stage, stage));
        }
        self.in_progress
            .as_mut()
            .ok_or_else(|| ScholarError::invalid_transition(ModuleStage::Idle, stage))
    }

    /// Records the idea of the current module.
    ///
    /// # Errors
    ///
    /// Fails unless the module is in the `Idea` stage.
    pub fn record_idea(&mut self, idea: ModuleIdea) -> Result<()> {
        self.in_progress_at(ModuleStage::Idea)?.idea = Some(idea);
        self.touch();
        Ok(())
    }

    /// Records the illustration of the current module.
    ///
    /// # Errors
    ///
    /// Fails unless the module is in the `Image` stage.
    pub fn record_image(&mut self, image: GeneratedImage) -> Result<()> {
        self.in_progress_at(ModuleStage::Image)?.image = Some(image);
        self.touch();
        Ok(())
    }

    /// Records the interactive document of the current module.
    ///
    /// # Errors
    ///
    /// Fails unless the module is in the `Content` stage.
    pub fn record_content(&mut self, content: InteractiveContent) -> Result<()> {
        self.in_progress_at(ModuleStage::Content)?.content = Some(content);
        self.touch();
        Ok(())
    }

    /// Records the narration script of the current module.
    ///
    /// # Errors
    ///
    /// Fails unless the module is in the `Script` stage.
    pub fn record_script(&mut self, script: AudioScript) -> Result<()> {
        self.in_progress_at(ModuleStage::Script)?.script = Some(script);
        self.touch();
        Ok(())
    }

    /// Finishes the current module with its audio and appends the record.
    ///
    /// # Errors
    ///
    /// Fails unless the module is in the `Speech` stage with every earlier
    /// artifact recorded.
    pub fn complete_module(
        &mut self,
        audio: crate::types::SynthesizedAudio,
    ) -> Result<&GeneratedModuleRecord> {
        if self.stage != ModuleStage::Speech {
            return Err(ScholarError::invalid_transition(self.stage, ModuleStage::Done));
        }
        let Some(InProgressModule {
            index,
            planned,
            idea: Some(idea),
            image: Some(image),
            content: Some(content),
            script: Some(script),
        }) = self.in_progress.take()
        else {
            return Err(ScholarError::invalid_transition(
                "incomplete module",
                ModuleStage::Done,
            ));
        };

        self.stage = ModuleStage::Done;
        self.modules.push(GeneratedModuleRecord {
            index,
            planned,
            idea,
            image,
            content,
            script,
            audio,
        });
        self.touch();
        self.modules
            .last()
            .ok_or_else(|| ScholarError::invalid_transition(ModuleStage::Speech, ModuleStage::Done))
    }

    /// Marks the run completed.
    ///
    /// # Errors
    ///
    /// Fails unless a module was just finished and the run is generating.
    pub fn complete(&mut self) -> Result<()> {
        if self.status != RunStatus::Generating || self.stage != ModuleStage::Done {
            return Err(ScholarError::invalid_transition(self.status, RunStatus::Completed));
        }
        self.status = RunStatus::Completed;
        self.current_module = None;
        self.touch();
        Ok(())
    }

    /// Records a step failure and ends the run.
    ///
    /// Finished modules are kept. The in-progress module keeps whatever
    /// artifacts it had so they stay viewable.
    ///
    /// # Errors
    ///
    /// Fails if the run has already finished.
    pub fn fail(&mut self, step: GenerationStep, message: impl Into<String>) -> Result<()> {
        if self.is_terminal() {
            return Err(ScholarError::invalid_transition(self.status, RunStatus::Failed));
        }
        let module_index = if step == GenerationStep::Plan {
            None
        } else {
            self.current_module
        };
        if !self.stage.is_terminal() && self.in_progress.is_some() {
            self.stage = ModuleStage::Error;
        }
        self.failure = Some(StageFailure {
            module_index,
            step,
            message: message.into(),
        });
        self.status = RunStatus::Failed;
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// Human-readable progress label.
    ///
    /// # Examples
    ///
    /// ```
    /// use scholar_orchestrator::{GenerationMode, PipelineState, Topic};
    ///
    /// let mut state = PipelineState::new("r", Topic::new("Tides").unwrap(), GenerationMode::Multi);
    /// state.start_planning().unwrap();
    /// assert_eq!(state.stage_label(), "Planning modules for \"Tides\"");
    /// ```
    #[must_use]
    pub fn stage_label(&self) -> String {
        match self.status {
            RunStatus::Pending => "Waiting to start".to_string(),
            RunStatus::Planning => format!("Planning modules for \"{}\"", self.topic),
            RunStatus::Generating => {
                let position = self.current_module.map_or(0, |i| i + 1);
                match self.total_modules() {
                    Some(total) => format!(
                        "Module {position} of {total}: {}",
                        self.stage.label()
                    ),
                    None => format!("Module {position}: {}", self.stage.label()),
                }
            }
            RunStatus::Completed => format!(
                "Completed {} module{}",
                self.modules.len(),
                if self.modules.len() == 1 { "" } else { "s" }
            ),
            RunStatus::Failed => match &self.failure {
                Some(StageFailure {
                    module_index: Some(index),
                    step,
                    message,
                }) => format!("Failed at {step} for module {}: {message}", index + 1),
                Some(StageFailure { step, message, .. }) => {
                    format!("Failed at {step}: {message}")
                }
                None => "Failed".to_string(),
            },
        }
    }

    /// Compact view for listings.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            topic: self.topic.to_string(),
            mode: self.mode,
            status: self.status,
            stage_label: self.stage_label(),
            modules_completed: self.modules.len(),
            total_modules: self.total_modules(),
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    /// Returns the duration since the run started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }
}

// ============================================================================
// Tests
// ============================================================================
