//! Plan step: topic to ordered module plan.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{parse_json, response_text};
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::prompts;
use crate::types::{ModulePlan, PlannedModule, Topic};

const STEP: GenerationStep = GenerationStep::Plan;

/// Input to the plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanInput {
    /// The topic to break down.
    pub topic: Topic,
    /// Upper bound on modules kept from the model's answer.
    pub max_modules: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    #[serde(default)]
    overall_topic: Option<String>,
    #[serde(default)]
    planned_modules: Vec<RawPlannedModule>,
}

#[derive(Debug, Deserialize)]
struct RawPlannedModule {
    #[serde(default)]
    title: String,
    #[serde(default)]
    concept: String,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overallTopic": { "type": "STRING" },
            "plannedModules": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "concept": { "type": "STRING" }
                    },
                    "required": ["title", "concept"]
                }
            }
        },
        "required": ["overallTopic", "plannedModules"]
    })
}

/// Breaks a topic into an ordered list of modules.
///
/// The plan is the root of a multi-module run, so every failure here is
/// fatal: a plan with no modules, or with an entry missing its title or
/// concept, is rejected. Modules beyond `max_modules` are dropped.
#[instrument(skip(gateway, models), fields(topic = %input.topic))]
pub async fn generate_plan(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: PlanInput,
) -> Result<ModulePlan> {
    let request = GenerateRequest::new(&models.text, OutputSpec::Json { schema: schema() })
        .with_text(prompts::plan_prompt(&input));

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;
    let text = response_text(STEP, response, "plan")?;
    let raw: RawPlan = parse_json(STEP, &text)?;

    if raw.planned_modules.is_empty() {
        return Err(ScholarError::step(STEP, "the model returned an empty plan"));
    }

    let mut planned_modules = Vec::with_capacity(raw.planned_modules.len());
    for (index, module) in raw.planned_modules.into_iter().enumerate() {
        let title = module.title.trim();
        let concept = module.concept.trim();
        if title.is_empty() || concept.is_empty() {
            return Err(ScholarError::step(
                STEP,
                format!("planned module {} is missing its title or concept", index + 1),
            ));
        }
        planned_modules.push(PlannedModule::new(title, concept));
    }

    if planned_modules.len() > input.max_modules {
        warn!(
            returned = planned_modules.len(),
            max = input.max_modules,
            "Plan exceeds module limit; truncating"
        );
        planned_modules.truncate(input.max_modules);
    }

    let overall_topic = raw
        .overall_topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| input.topic.as_str().to_string());

    info!(modules = planned_modules.len(), "Module plan ready");
    Ok(ModulePlan {
        overall_topic,
        planned_modules,
    })
}
