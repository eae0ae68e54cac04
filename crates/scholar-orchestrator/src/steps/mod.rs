//! Generation steps.
//!
//! Each step wraps exactly one model gateway call behind a typed input struct
//! and returns its own output type or the error variant belonging to that
//! step. Steps hold no state; the pipeline threads outputs from one step into
//! the next.

pub mod background;
pub mod content;
pub mod idea;
pub mod image;
pub mod plan;
pub mod script;
pub mod speech;

pub use background::{remove_background, BackgroundRemovalInput};
pub use content::{generate_content, ContentInput};
pub use idea::{generate_idea, IdeaInput};
pub use image::{generate_image, ImageInput};
pub use plan::{generate_plan, PlanInput};
pub use script::{generate_script, ScriptInput};
pub use speech::{synthesize_speech, SpeechInput};

use scholar_gateway::{DataUri, GenerateResponse, Media, MediaSource, ModelGateway};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{GenerationStep, Result, ScholarError};

/// Longest preview of model output written to logs.
const LOG_PREVIEW_CHARS: usize = 200;

/// Returns the trimmed text of a response, or the step's error.
fn response_text(step: GenerationStep, response: GenerateResponse, what: &str) -> Result<String> {
    response
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ScholarError::step(step, format!("the model returned no {what}")))
}

/// Parses a JSON object out of model text.
///
/// Models sometimes wrap JSON in prose or code fences; everything outside
/// the outermost braces is ignored.
fn parse_json<T: DeserializeOwned>(step: GenerationStep, text: &str) -> Result<T> {
    let json = extract_json(text).ok_or_else(|| {
        debug!(output = %truncate_for_log(text, LOG_PREVIEW_CHARS), "No JSON object in output");
        ScholarError::step(step, "the model output contained no JSON object")
    })?;
    serde_json::from_str(json).map_err(|e| {
        debug!(output = %truncate_for_log(json, LOG_PREVIEW_CHARS), "Malformed step output");
        ScholarError::step(step, format!("the model output was malformed: {e}"))
    })
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={char_count}]"));
    preview
}

/// Turns response media into an inline data URI, fetching remote payloads.
///
/// `default_type` is used when neither the response nor the fetched resource
/// declares a media type.
async fn resolve_media(
    gateway: &dyn ModelGateway,
    step: GenerationStep,
    media: Media,
    default_type: &str,
) -> Result<DataUri> {
    let (declared, bytes) = match media.source {
        MediaSource::Inline(bytes) => (media.content_type, bytes),
        MediaSource::Remote(url) => {
            debug!(url = %truncate_for_log(&url, 80), "Fetching remote media");
            let fetched = gateway
                .fetch(&url)
                .await
                .map_err(|e| ScholarError::step_failed(step, "failed to retrieve media", e))?;
            let declared = if media.content_type.trim().is_empty() {
                fetched.content_type.unwrap_or_default()
            } else {
                media.content_type
            };
            (declared, fetched.bytes)
        }
    };

    if bytes.is_empty() {
        return Err(ScholarError::step(step, "the model returned an empty media payload"));
    }

    let media_type = if declared.trim().is_empty() {
        default_type.to_string()
    } else {
        declared
    };
    Ok(DataUri::new(media_type, bytes))
}

/// Requires text to be present after trimming.
fn require(step: GenerationStep, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ScholarError::step(step, format!("missing required field '{field}'")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use scholar_gateway::ScriptedGateway;

    use super::*;

    #[test]
    fn test_extract_json_ignores_fences() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        let long = "x".repeat(20);
        let preview = truncate_for_log(&long, 5);
        assert!(preview.starts_with("xxxxx..."));
        assert!(preview.contains("total_chars=20"));
    }

    #[test]
    fn test_response_text_rejects_blank() {
        let err = response_text(GenerationStep::Script, GenerateResponse::text("  "), "script")
            .unwrap_err();
        assert!(matches!(err, ScholarError::ScriptGeneration { .. }));
        assert!(err.to_string().contains("no script"));
    }

    #[test]
    fn test_parse_json_reports_step() {
        let err = parse_json::<serde_json::Value>(GenerationStep::Idea, "sorry").unwrap_err();
        assert!(matches!(err, ScholarError::IdeaGeneration { .. }));
    }

    #[tokio::test]
    async fn test_resolve_media_fetches_remote() {
        let gateway = ScriptedGateway::new();
        gateway.serve_remote("https://media.test/a", Some("audio/ogg"), vec![1, 2]);

        let uri = resolve_media(
            &gateway,
            GenerationStep::Speech,
            Media::remote("", "https://media.test/a"),
            "audio/mpeg",
        )
        .await
        .unwrap();
        assert_eq!(uri.media_type(), "audio/ogg");
        assert_eq!(uri.data(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_resolve_media_defaults_type() {
        let gateway = ScriptedGateway::new();
        gateway.serve_remote("https://media.test/a", None, vec![1]);

        let uri = resolve_media(
            &gateway,
            GenerationStep::Speech,
            Media::remote("", "https://media.test/a"),
            "audio/mpeg",
        )
        .await
        .unwrap();
        assert_eq!(uri.media_type(), "audio/mpeg");
    }

    #[tokio::test]
    async fn test_resolve_media_rejects_empty_payload() {
        let gateway = ScriptedGateway::new();
        let err = resolve_media(
            &gateway,
            GenerationStep::Image,
            Media::inline("image/png", Vec::new()),
            "image/png",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScholarError::ImageGeneration { .. }));
    }
}
