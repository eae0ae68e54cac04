//! Standalone image tool.
//!
//! Turns a prompt into an illustration and can optionally ask for a copy with
//! a transparent background. A failed background pass does not lose the
//! original image: it is reported next to it instead.

use std::io::Cursor;

use chrono::Utc;
use image::ImageReader;
use scholar_gateway::ModelGateway;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ModelConfig};
use crate::error::{Result, ScholarError};
use crate::steps::{generate_image, remove_background, BackgroundRemovalInput, ImageInput};
use crate::types::GeneratedImage;

/// Characters of the prompt kept in download file names.
const FILE_NAME_PROMPT_CHARS: usize = 25;

/// Prefix of every download file name.
const FILE_NAME_PREFIX: &str = "gemini_alchemist_";

/// Stem used for an empty prompt.
const FALLBACK_STEM: &str = "generated_image";

/// A request to the image tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageToolRequest {
    /// Description of the image.
    pub prompt: String,
    /// Whether to also produce a transparent-background copy.
    #[serde(default)]
    pub remove_background: bool,
}

/// Result of the image tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageToolOutcome {
    /// The generated image.
    pub image: GeneratedImage,
    /// The transparent-background copy, when requested and successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<GeneratedImage>,
    /// Why background removal failed, when requested and unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_error: Option<String>,
    /// Suggested name for saving the preferred image.
    pub download_file_name: String,
}

impl ImageToolOutcome {
    /// The image to show and download: the processed copy when there is one.
    #[must_use]
    pub fn preferred_image(&self) -> &GeneratedImage {
        self.processed_image.as_ref().unwrap_or(&self.image)
    }
}

/// Generates standalone images.
#[derive(Debug, Clone)]
pub struct ImageTool<G> {
    gateway: G,
    models: ModelConfig,
}

impl<G: ModelGateway> ImageTool<G> {
    /// Creates an image tool that calls `gateway` with the models in `config`.
    #[must_use]
    pub fn new(gateway: G, config: &Config) -> Self {
        Self {
            gateway,
            models: config.models.clone(),
        }
    }

    /// Generates an image, then optionally removes its background.
    ///
    /// # Errors
    ///
    /// Returns [`ScholarError::EmptyPrompt`] for a blank prompt and
    /// [`ScholarError::ImageGeneration`] when no image is produced. A
    /// background-removal failure is not an error.
    #[instrument(skip_all, fields(remove_background = request.remove_background))]
    pub async fn generate(&self, request: ImageToolRequest) -> Result<ImageToolOutcome> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(ScholarError::EmptyPrompt);
        }

        let image = generate_image(
            &self.gateway,
            &self.models,
            ImageInput {
                prompt: prompt.to_string(),
            },
        )
        .await?;

        let (processed_image, background_error) = if request.remove_background {
            match remove_background(
                &self.gateway,
                &self.models,
                BackgroundRemovalInput {
                    image: image.clone(),
                },
            )
            .await
            {
                Ok(processed) => (Some(processed), None),
                Err(err) => {
                    let message = err
                        .step_message()
                        .map_or_else(|| err.to_string(), ToString::to_string);
                    warn!(error = %err, "Background removal failed; keeping original image");
                    (None, Some(message))
                }
            }
        } else {
            (None, None)
        };

        let preferred = processed_image.as_ref().unwrap_or(&image);
        let download_file_name = download_file_name(
            prompt,
            processed_image.is_some(),
            image_dimensions(preferred.image_data_uri.data()),
            Utc::now().timestamp_millis(),
        );

        info!(file = %download_file_name, "Image ready");
        Ok(ImageToolOutcome {
            image,
            processed_image,
            background_error,
            download_file_name,
        })
    }
}

/// Builds the download file name for a generated image.
///
/// `gemini_alchemist_<prompt><_no_bg><_WxH>_<millis>.png`, where the prompt
/// part is its first 25 characters with everything outside `[A-Za-z0-9_]`
/// replaced by `_` and runs of `_` collapsed. A prompt of only symbols
/// collapses to a single `_` and is kept as is.
///
/// # Examples
///
/// ```
/// use scholar_orchestrator::image_tool::download_file_name;
///
/// let name = download_file_name("Red fox", true, Some((640, 480)), 42);
/// assert_eq!(name, "gemini_alchemist_Red_fox_no_bg_640x480_42.png");
/// ```
#[must_use]
pub fn download_file_name(
    prompt: &str,
    background_removed: bool,
    dimensions: Option<(u32, u32)>,
    timestamp_millis: i64,
) -> String {
    let mut stem = String::with_capacity(FILE_NAME_PROMPT_CHARS);
    for c in prompt.chars().take(FILE_NAME_PROMPT_CHARS) {
        let c = if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' };
        if c == '_' && stem.ends_with('_') {
            continue;
        }
        stem.push(c);
    }
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }

    let background = if background_removed { "_no_bg" } else { "" };
    let size = dimensions.map_or_else(String::new, |(w, h)| format!("_{w}x{h}"));
    format!("{FILE_NAME_PREFIX}{stem}{background}{size}_{timestamp_millis}.png")
}

/// Reads the pixel size of an encoded image from its header.
///
/// The format is detected from the bytes, so PNG, JPEG, WebP and GIF output
/// all work. Returns `None` when the header cannot be decoded.
#[must_use]
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(err) => {
            debug!(error = %err, "Could not read image dimensions");
            None
        }
    }
}
