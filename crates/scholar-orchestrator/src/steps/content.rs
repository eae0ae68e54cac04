//! Interactive-content step: image and idea to a self-contained HTML lesson.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::{parse_json, response_text};
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::placeholder::substitute_image_placeholder;
use crate::prompts;
use crate::types::{GeneratedImage, InteractiveContent};

const STEP: GenerationStep = GenerationStep::Content;

/// Input to the interactive-content step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInput {
    /// The illustration to embed.
    pub image: GeneratedImage,
    /// Concept the lesson explains.
    pub animation_concept: String,
    /// Style keywords.
    pub suggested_keywords: Vec<String>,
    /// Module title.
    pub module_title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContent {
    #[serde(default)]
    html_content: String,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": { "htmlContent": { "type": "STRING" } },
        "required": ["htmlContent"]
    })
}

/// Generates the interactive document and embeds the image into it.
///
/// The model writes the placeholder token where the image goes; every
/// occurrence is then replaced with the image data URI. A document without
/// the token is kept as returned and only logged.
#[instrument(skip(gateway, models, input), fields(title = %input.module_title))]
pub async fn generate_content(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: ContentInput,
) -> Result<InteractiveContent> {
    let request = GenerateRequest::new(&models.text, OutputSpec::Json { schema: schema() })
        .with_text(prompts::content_prompt(&input));

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;
    let text = response_text(STEP, response, "content")?;
    let raw: RawContent = parse_json(STEP, &text)?;

    if raw.html_content.trim().is_empty() {
        return Err(ScholarError::step(STEP, "missing required field 'htmlContent'"));
    }

    let data_uri = input.image.image_data_uri.to_string();
    let substitution = substitute_image_placeholder(&raw.html_content, &data_uri);
    if substitution.replacements == 0 {
        warn!("Generated document has no image placeholder; it will render without the image");
    } else {
        debug!(replacements = substitution.replacements, "Image embedded");
    }

    Ok(InteractiveContent {
        html_content: substitution.html,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use scholar_gateway::{DataUri, ScriptedGateway};

    use super::*;
    use crate::placeholder::IMAGE_PLACEHOLDER;

    fn input() -> ContentInput {
        ContentInput {
            image: GeneratedImage {
                image_data_uri: DataUri::new("image/png", b"abc".to_vec()),
            },
            animation_concept: "Leaves capture light.".to_string(),
            suggested_keywords: vec!["reveal".to_string()],
            module_title: "Sunlight Kitchen".to_string(),
        }
    }

    #[tokio::test]
    async fn test_placeholder_is_replaced() {
        let models = ModelConfig::default();
        let gateway = ScriptedGateway::new();
        let html = format!("<html><img src=\"{IMAGE_PLACEHOLDER}\"></html>");
        gateway.push_json(&models.text, &json!({ "htmlContent": html }));

        let content = generate_content(&gateway, &models, input()).await.unwrap();
        assert!(!content.html_content.contains(IMAGE_PLACEHOLDER));
        assert!(content
            .html_content
            .contains("<img src=\"data:image/png;base64,YWJj\">"));

        let prompt = gateway.requests()[0].prompt_text();
        assert!(prompt.contains(IMAGE_PLACEHOLDER));
        assert!(!prompt.contains("YWJj"));
    }

    #[tokio::test]
    async fn test_missing_placeholder_keeps_raw_output() {
        let models = ModelConfig::default();
        let gateway = ScriptedGateway::new();
        let html = "<html><body><h2>No picture</h2></body></html>";
        gateway.push_json(&models.text, &json!({ "htmlContent": html }));

        let content = generate_content(&gateway, &models, input()).await.unwrap();
        assert_eq!(content.html_content, html);
    }

    #[tokio::test]
    async fn test_empty_content_is_content_error() {
        let models = ModelConfig::default();
        let gateway = ScriptedGateway::new();
        gateway.push_json(&models.text, &json!({ "htmlContent": "" }));

        let err = generate_content(&gateway, &models, input()).await.unwrap_err();
        assert!(matches!(err, ScholarError::ContentGeneration { .. }));
        assert!(err.to_string().contains("htmlContent"));
    }
}
