//! Script step: module context to narration text.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use tracing::{debug, instrument};

use super::response_text;
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::prompts;
use crate::types::AudioScript;

const STEP: GenerationStep = GenerationStep::Script;

/// Input to the script step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInput {
    /// Title of the module being narrated.
    pub current_module_title: String,
    /// Concept of the module being narrated.
    pub current_module_concept: String,
    /// Topic of the whole plan.
    pub overall_topic: String,
    /// Position in the plan, starting at 0.
    pub module_index: usize,
    /// Number of modules in the plan.
    pub total_modules: usize,
    /// Concept of the preceding module. Ignored for the first module.
    pub previous_module_concept: Option<String>,
}

/// Generates the narration script for one module.
#[instrument(skip(gateway, models, input), fields(index = input.module_index))]
pub async fn generate_script(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: ScriptInput,
) -> Result<AudioScript> {
    let request = GenerateRequest::new(&models.text, OutputSpec::Text)
        .with_text(prompts::script_prompt(&input));

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;
    let audio_script = response_text(STEP, response, "script")?;

    debug!(words = audio_script.split_whitespace().count(), "Script ready");
    Ok(AudioScript { audio_script })
}
