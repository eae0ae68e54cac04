//! Idea step: topic or concept to module idea.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{parse_json, require, response_text};
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::prompts;
use crate::types::ModuleIdea;

const STEP: GenerationStep = GenerationStep::Idea;

/// Input to the idea step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaInput {
    /// A topic, or the concept of a planned module.
    pub topic: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdea {
    #[serde(default)]
    module_title: String,
    #[serde(default)]
    image_prompt: String,
    #[serde(default)]
    animation_concept: String,
    #[serde(default)]
    suggested_keywords: Vec<String>,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "moduleTitle": { "type": "STRING" },
            "imagePrompt": { "type": "STRING" },
            "animationConcept": { "type": "STRING" },
            "suggestedKeywords": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["moduleTitle", "imagePrompt", "animationConcept", "suggestedKeywords"]
    })
}

/// Generates the title, illustration prompt and concept for one module.
#[instrument(skip(gateway, models, input))]
pub async fn generate_idea(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: IdeaInput,
) -> Result<ModuleIdea> {
    let request = GenerateRequest::new(&models.text, OutputSpec::Json { schema: schema() })
        .with_text(prompts::idea_prompt(&input));

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;
    let text = response_text(STEP, response, "idea")?;
    let raw: RawIdea = parse_json(STEP, &text)?;

    require(STEP, "moduleTitle", &raw.module_title)?;
    require(STEP, "imagePrompt", &raw.image_prompt)?;
    require(STEP, "animationConcept", &raw.animation_concept)?;

    let suggested_keywords: Vec<String> = raw
        .suggested_keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if suggested_keywords.is_empty() {
        return Err(ScholarError::step(
            STEP,
            "missing required field 'suggestedKeywords'",
        ));
    }

    debug!(title = %raw.module_title.trim(), keywords = suggested_keywords.len(), "Idea ready");
    Ok(ModuleIdea {
        module_title: raw.module_title.trim().to_string(),
        image_prompt: raw.image_prompt.trim().to_string(),
        animation_concept: raw.animation_concept.trim().to_string(),
        suggested_keywords,
    })
}
