//! Background-removal step: image to image with transparency.
//!
//! Only the standalone image tool uses this step.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use tracing::{debug, instrument};

use super::resolve_media;
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::prompts::BACKGROUND_REMOVAL_PROMPT;
use crate::types::GeneratedImage;

const STEP: GenerationStep = GenerationStep::BackgroundRemoval;

/// Input to the background-removal step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundRemovalInput {
    /// The image to process. It is not modified.
    pub image: GeneratedImage,
}

/// Asks the model for a transparent-background copy of an image.
///
/// Returns a new [`GeneratedImage`]; the input is left untouched so the
/// caller can keep showing it when this step fails.
#[instrument(skip(gateway, models, input))]
pub async fn remove_background(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: BackgroundRemovalInput,
) -> Result<GeneratedImage> {
    let request = GenerateRequest::new(&models.background_removal, OutputSpec::Image)
        .with_media(input.image.image_data_uri)
        .with_text(BACKGROUND_REMOVAL_PROMPT);

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;

    let media = response
        .media
        .ok_or_else(|| ScholarError::step(STEP, "the model did not return an image"))?;
    let uri = resolve_media(gateway, STEP, media, "image/png").await?;

    if !uri.essence().starts_with("image/") {
        return Err(ScholarError::step(
            STEP,
            format!("the model returned '{}' instead of an image", uri.media_type()),
        ));
    }

    debug!(media_type = %uri.media_type(), bytes = uri.data().len(), "Background removed");
    Ok(GeneratedImage {
        image_data_uri: uri,
    })
}
