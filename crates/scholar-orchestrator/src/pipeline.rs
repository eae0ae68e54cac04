//! Pipeline orchestrator.
//!
//! A [`Pipeline`] drives one run from topic to finished modules. The run's
//! [`PipelineState`] is moved in, threaded through every step, and returned
//! at the end; after each transition a snapshot is published on the run's
//! [`ProgressReporter`] and a [`PipelineEvent`] is broadcast.
//!
//! Steps run strictly one after another. The first failing step ends the
//! run; modules finished before it stay in the returned state.

use scholar_gateway::ModelGateway;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, GenerationMode, ModelConfig};
use crate::error::{GenerationStep, Result, ScholarError};
use crate::pipeline_state::{ModuleStage, PipelineState};
use crate::steps::{
    generate_content, generate_idea, generate_image, generate_plan, generate_script,
    synthesize_speech, ContentInput, IdeaInput, ImageInput, PlanInput, ScriptInput, SpeechInput,
};
use crate::types::PlannedModule;
use crate::websocket::{EventBroadcaster, PipelineEvent};

// ============================================================================
// ProgressReporter
// ============================================================================

/// Publishes a run's progress.
///
/// State snapshots go to a `watch` channel owned by the run, so readers
/// always see the latest complete state. Events go to the shared
/// broadcaster.
#[derive(Debug)]
pub struct ProgressReporter {
    state: watch::Sender<PipelineState>,
    events: EventBroadcaster,
}

impl ProgressReporter {
    /// Creates a reporter seeded with `initial` and returns the receiving
    /// end of its state channel.
    #[must_use]
    pub fn new(
        initial: &PipelineState,
        events: EventBroadcaster,
    ) -> (Self, watch::Receiver<PipelineState>) {
        let (state, receiver) = watch::channel(initial.clone());
        (Self { state, events }, receiver)
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, state: &PipelineState) {
        self.state.send_replace(state.clone());
    }

    /// Broadcasts an event.
    pub fn emit(&self, event: PipelineEvent) {
        let receivers = self.events.send(event);
        debug!(receivers, "Event broadcast");
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Where a module sits in its run.
struct ModuleContext<'a> {
    index: usize,
    total: usize,
    planned: PlannedModule,
    overall_topic: &'a str,
    previous_concept: Option<String>,
}

/// Runs the generation steps for a run.
#[derive(Debug, Clone)]
pub struct Pipeline<G> {
    gateway: G,
    models: ModelConfig,
    max_modules: usize,
}

impl<G: ModelGateway> Pipeline<G> {
    /// Creates a pipeline that calls `gateway` with the models in `config`.
    #[must_use]
    pub fn new(gateway: G, config: &Config) -> Self {
        Self {
            gateway,
            models: config.models.clone(),
            max_modules: config.max_modules,
        }
    }

    /// The gateway this pipeline calls.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// The models this pipeline uses.
    #[must_use]
    pub const fn models(&self) -> &ModelConfig {
        &self.models
    }

    /// Runs the pipeline to completion and returns the final state.
    ///
    /// Never fails: a step error is recorded on the state as the run's
    /// failure and the state is returned with status `Failed`.
    #[instrument(skip_all, fields(run_id = %state.run_id, mode = %state.mode))]
    pub async fn run(&self, mut state: PipelineState, reporter: &ProgressReporter) -> PipelineState {
        info!(topic = %state.topic, "Run started");
        reporter.emit(PipelineEvent::run_started(
            &state.run_id,
            state.topic.as_str(),
            state.mode,
        ));
        reporter.publish(&state);

        let outcome = match state.mode {
            GenerationMode::Single => self.run_single(&mut state, reporter).await,
            GenerationMode::Multi => self.run_multi(&mut state, reporter).await,
        };

        match outcome {
            Ok(()) => info!(modules = state.modules.len(), "Run completed"),
            Err(err) => record_failure(&mut state, reporter, &err),
        }

        // Publish first so readers reacting to `run_complete` see the final state.
        reporter.publish(&state);
        reporter.emit(PipelineEvent::run_complete(
            &state.run_id,
            state.status,
            state.stage_label(),
            state.modules.len(),
        ));
        state
    }

    async fn run_single(&self, state: &mut PipelineState, reporter: &ProgressReporter) -> Result<()> {
        let topic = state.topic.as_str().to_string();
        let context = ModuleContext {
            index: 0,
            total: 1,
            planned: PlannedModule::new(&topic, &topic),
            overall_topic: &topic,
            previous_concept: None,
        };
        self.run_module(state, reporter, context).await?;
        state.complete()
    }

    async fn run_multi(&self, state: &mut PipelineState, reporter: &ProgressReporter) -> Result<()> {
        state.start_planning()?;
        reporter.publish(state);

        let plan = generate_plan(
            &self.gateway,
            &self.models,
            PlanInput {
                topic: state.topic.clone(),
                max_modules: self.max_modules,
            },
        )
        .await?;

        state.set_plan(plan.clone())?;
        reporter.emit(PipelineEvent::plan_ready(&state.run_id, plan.clone()));
        reporter.publish(state);

        let total = plan.len();
        for (index, planned) in plan.planned_modules.iter().enumerate() {
            let previous_concept = index
                .checked_sub(1)
                .and_then(|i| plan.planned_modules.get(i))
                .map(|m| m.concept.clone());
            let context = ModuleContext {
                index,
                total,
                planned: planned.clone(),
                overall_topic: &plan.overall_topic,
                previous_concept,
            };
            self.run_module(state, reporter, context).await?;
        }
        state.complete()
    }

    async fn run_module(
        &self,
        state: &mut PipelineState,
        reporter: &ProgressReporter,
        context: ModuleContext<'_>,
    ) -> Result<()> {
        let gateway: &dyn ModelGateway = &self.gateway;
        let models = &self.models;

        state.begin_module(context.index, context.planned.clone())?;
        reporter.publish(state);

        enter_stage(state, reporter, ModuleStage::Idea)?;
        let idea = generate_idea(
            gateway,
            models,
            IdeaInput {
                topic: context.planned.concept.clone(),
            },
        )
        .await?;
        state.record_idea(idea.clone())?;

        enter_stage(state, reporter, ModuleStage::Image)?;
        let image = generate_image(
            gateway,
            models,
            ImageInput {
                prompt: idea.image_prompt.clone(),
            },
        )
        .await?;
        state.record_image(image.clone())?;

        enter_stage(state, reporter, ModuleStage::Content)?;
        let content = generate_content(
            gateway,
            models,
            ContentInput {
                image,
                animation_concept: idea.animation_concept.clone(),
                suggested_keywords: idea.suggested_keywords.clone(),
                module_title: idea.module_title.clone(),
            },
        )
        .await?;
        state.record_content(content)?;

        enter_stage(state, reporter, ModuleStage::Script)?;
        let script = generate_script(
            gateway,
            models,
            ScriptInput {
                current_module_title: context.planned.title.clone(),
                current_module_concept: context.planned.concept.clone(),
                overall_topic: context.overall_topic.to_string(),
                module_index: context.index,
                total_modules: context.total,
                previous_module_concept: context.previous_concept,
            },
        )
        .await?;
        state.record_script(script.clone())?;

        enter_stage(state, reporter, ModuleStage::Speech)?;
        let audio = synthesize_speech(
            gateway,
            models,
            SpeechInput {
                text: script.audio_script,
            },
        )
        .await?;

        let title = state.complete_module(audio)?.idea.module_title.clone();
        info!(index = context.index, title = %title, "Module completed");
        reporter.emit(PipelineEvent::module_completed(
            &state.run_id,
            context.index,
            title,
        ));
        reporter.publish(state);
        Ok(())
    }
}

fn enter_stage(
    state: &mut PipelineState,
    reporter: &ProgressReporter,
    stage: ModuleStage,
) -> Result<()> {
    state.advance(stage)?;
    let label = state.stage_label();
    debug!(stage = %stage, "{label}");
    reporter.emit(PipelineEvent::stage_started(
        &state.run_id,
        state.current_module.unwrap_or_default(),
        stage,
        label,
    ));
    reporter.publish(state);
    Ok(())
}

fn record_failure(state: &mut PipelineState, reporter: &ProgressReporter, err: &ScholarError) {
    let step = err
        .generation_step()
        .or_else(|| state.stage.step())
        .unwrap_or(GenerationStep::Plan);
    let message = err
        .step_message()
        .map_or_else(|| err.to_string(), ToString::to_string);

    warn!(
        step = %step,
        module = ?state.current_module,
        error = %err,
        "Run failed"
    );

    if let Err(e) = state.fail(step, message.clone()) {
        warn!(error = %e, "Could not record failure");
    }

    reporter.emit(PipelineEvent::error(
        Some(state.run_id.clone()),
        state.failure.as_ref().and_then(|f| f.module_index),
        Some(step),
        message,
    ));
}

// ============================================================================
// Tests
// ============================================================================
