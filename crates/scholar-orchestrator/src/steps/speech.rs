//! Speech step: narration text to playable audio.

use scholar_gateway::{GenerateRequest, ModelGateway, OutputSpec};
use tracing::{debug, instrument};

use super::resolve_media;
use crate::audio::normalize_audio;
use crate::config::ModelConfig;
use crate::error::{GenerationStep, Result, ScholarError};
use crate::types::SynthesizedAudio;

const STEP: GenerationStep = GenerationStep::Speech;

/// Media type assumed when neither the model nor the fetched resource
/// declares one.
const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Input to the speech step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechInput {
    /// Text to speak.
    pub text: String,
}

/// Synthesizes narration audio and normalizes it into a playable container.
///
/// The payload may arrive inline or as a reference to fetch. Either way the
/// result is a data URI; headerless PCM is wrapped into WAV. This step never
/// succeeds with an empty payload.
#[instrument(skip(gateway, models, input), fields(chars = input.text.len()))]
pub async fn synthesize_speech(
    gateway: &dyn ModelGateway,
    models: &ModelConfig,
    input: SpeechInput,
) -> Result<SynthesizedAudio> {
    if input.text.trim().is_empty() {
        return Err(ScholarError::step(STEP, "there is no text to speak"));
    }

    let request = GenerateRequest::new(
        &models.speech,
        OutputSpec::Speech {
            voice: models.voice.clone(),
        },
    )
    .with_text(input.text);

    let response = gateway
        .generate(request)
        .await
        .map_err(|e| ScholarError::step_failed(STEP, "the model request failed", e))?;

    let media = response
        .media
        .ok_or_else(|| ScholarError::step(STEP, "the model did not return audio"))?;
    let raw = resolve_media(gateway, STEP, media, DEFAULT_AUDIO_TYPE).await?;
    let declared = raw.media_type().to_string();

    let audio = normalize_audio(raw)
        .map_err(|e| ScholarError::step(STEP, format!("could not normalize '{declared}': {e}")))?;
    if audio.is_empty() {
        return Err(ScholarError::step(STEP, "the normalized audio is empty"));
    }

    debug!(
        declared = %declared,
        media_type = %audio.media_type(),
        bytes = audio.data().len(),
        "Speech ready"
    );
    Ok(SynthesizedAudio {
        audio_data_uri: audio,
    })
}
