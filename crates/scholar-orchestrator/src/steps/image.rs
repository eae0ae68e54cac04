//! Image step: prompt to illustration.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use tracing::{debug, instrument};

use super::resolve_media;
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::types::GeneratedImage;

const STEP: GenerationStep = GenerationStep::Image;

/// Media type assumed when the model does not declare one.
const DEFAULT_IMAGE_TYPE: &str = "image/png";

/// Input to the image step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Description of the illustration.
    pub prompt: String,
}

/// Generates an illustration as an inline data URI.
///
/// Remote image references are fetched and inlined. A response without an
/// image fails with [`ScholarError::ImageGeneration`].
#[instrument(skip(gateway, models, input))]
pub async fn generate_image(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: ImageInput,
) -> Result<GeneratedImage> {
    if input.prompt.trim().is_empty() {
        return Err(ScholarError::step(STEP, "the image prompt is empty"));
    }

    let request = GenerateRequest::new(&models.image, OutputSpec::Image).with_text(input.prompt);
    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;

    let media = response
        .media
        .ok_or_else(|| ScholarError::step(STEP, "the model did not return an image"))?;
    let uri = resolve_media(gateway, STEP, media, DEFAULT_IMAGE_TYPE).await?;

    if !uri.essence().starts_with("image/") {
        return Err(ScholarError::step(
            STEP,
            format!("the model returned '{}' instead of an image", uri.media_type()),
        ));
    }

    debug!(media_type = %uri.media_type(), bytes = uri.data().len(), "Image ready");
    Ok(GeneratedImage {
        image_data_uri: uri,
    })
}
