//! Gemini REST client.
//!
//! Implements [`ModelGateway`] on top of the `generateContent` endpoint of the
//! Gemini API. Text, JSON, image and speech requests all go through the same
//! call; only the `generationConfig` differs.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    DataUri, FetchedMedia, GatewayError, GatewayErrorKind, GenerateRequest, GenerateResponse,
    Media, ModelGateway, OutputSpec, Part,
};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default Gemini API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base endpoint URL.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl GeminiConfig {
    /// Builds a configuration, reading the API key from `env_var`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MissingApiKey`] if the variable is unset or empty.
    pub fn from_env(
        env_var: &str,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let api_key = std::env::var(env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GatewayError::MissingApiKey {
                env_var: env_var.to_string(),
            })?;
        Ok(Self {
            api_key,
            endpoint: endpoint.into(),
            timeout_secs,
        })
    }
}

/// Gemini model gateway.
pub struct GeminiGateway {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl std::fmt::Debug for GeminiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGateway")
            .field("endpoint", &self.config.endpoint)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl GeminiGateway {
    /// Creates a new Gemini gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::ClientBuild(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_url(&self, model: &str) -> String {
        let model = model.strip_prefix("googleai/").unwrap_or(model);
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }

    fn headers(&self) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.config.api_key).map_err(|_| {
            GatewayError::request(
                GatewayErrorKind::Authentication,
                "API key contains invalid header characters",
            )
        })?;
        headers.insert(API_KEY_HEADER, key);
        Ok(headers)
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<GeminiSpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiSpeechConfig {
    voice_config: GeminiVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiVoiceConfig {
    prebuilt_voice_config: GeminiPrebuiltVoice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPrebuiltVoice {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    text: Option<String>,
    inline_data: Option<GeminiBlob>,
    file_data: Option<GeminiFileData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFileData {
    mime_type: Option<String>,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[allow(dead_code)]
    code: Option<i32>,
}

fn build_body(request: GenerateRequest) -> GeminiRequest {
    let parts = request
        .parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => GeminiPart::Text { text },
            Part::Media(uri) => GeminiPart::Inline {
                inline_data: GeminiBlob {
                    mime_type: uri.media_type().to_string(),
                    data: STANDARD.encode(uri.data()),
                },
            },
        })
        .collect();

    let generation_config = match request.output {
        OutputSpec::Text => GeminiGenerationConfig::default(),
        OutputSpec::Json { schema } => GeminiGenerationConfig {
            response_mime_type: Some("application/json"),
            response_schema: Some(schema),
            ..Default::default()
        },
        OutputSpec::Image => GeminiGenerationConfig {
            response_modalities: Some(vec!["TEXT", "IMAGE"]),
            ..Default::default()
        },
        OutputSpec::Speech { voice } => GeminiGenerationConfig {
            response_modalities: Some(vec!["AUDIO"]),
            speech_config: Some(GeminiSpeechConfig {
                voice_config: GeminiVoiceConfig {
                    prebuilt_voice_config: GeminiPrebuiltVoice { voice_name: voice },
                },
            }),
            ..Default::default()
        },
    };

    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts,
        }],
        generation_config,
    }
}

fn parse_response(body: &str) -> Result<GenerateResponse, GatewayError> {
    let parsed: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::InvalidResponse(format!("malformed JSON: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(GatewayError::request(
            GatewayErrorKind::Other,
            format!("Gemini API error: {}", error.message),
        ));
    }

    let Some(candidate) = parsed.candidates.and_then(|c| c.into_iter().next()) else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(GatewayError::request(
            GatewayErrorKind::Other,
            format!("prompt rejected: {reason}"),
        ));
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    if parts.is_empty() {
        debug!(finish_reason = ?candidate.finish_reason, "Candidate carried no parts");
    }

    let mut text = String::new();
    let mut media = None;
    for part in parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if media.is_some() {
            continue;
        }
        if let Some(blob) = part.inline_data {
            let bytes = STANDARD
                .decode(blob.data.trim())
                .map_err(|e| GatewayError::InvalidResponse(format!("bad inline data: {e}")))?;
            media = Some(Media::inline(blob.mime_type, bytes));
        } else if let Some(file) = part.file_data {
            media = Some(Media::remote(
                file.mime_type.unwrap_or_default(),
                file.file_uri,
            ));
        }
    }

    Ok(GenerateResponse {
        text: (!text.is_empty()).then_some(text),
        media,
    })
}

fn transport_error(e: &reqwest::Error) -> GatewayErrorKind {
    if e.is_timeout() || e.is_connect() {
        GatewayErrorKind::Network
    } else {
        GatewayErrorKind::Other
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        let url = self.build_url(&request.model);
        let body = build_body(request);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(transport_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini request rejected");
            return Err(GatewayError::request(
                GatewayErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {text}"),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::request(transport_error(&e), e.to_string()))?;

        let parsed = parse_response(&text)?;
        debug!(
            text_len = parsed.text.as_ref().map_or(0, String::len),
            has_media = parsed.media.is_some(),
            "Gemini response parsed"
        );
        Ok(parsed)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, GatewayError> {
        if url.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
            let uri: DataUri = url.parse()?;
            return Ok(FetchedMedia {
                content_type: Some(uri.media_type().to_string()),
                bytes: uri.into_data(),
            });
        }

        let mut request = self.client.get(url);
        if !self.config.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.config.api_key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::fetch(url, format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::fetch(url, e.to_string()))?;

        debug!(bytes = bytes.len(), content_type = ?content_type, "Fetched media");
        Ok(FetchedMedia {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GeminiConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout_secs, 120);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_from_env_missing_key() {
        let err = GeminiConfig::from_env("SCHOLAR_TEST_UNSET_KEY_VAR", DEFAULT_ENDPOINT, 10)
            .unwrap_err();
        assert!(
            matches!(&err, GatewayError::MissingApiKey { env_var } if env_var == "SCHOLAR_TEST_UNSET_KEY_VAR")
        );
    }

    #[test]
    fn test_build_url_strips_provider_prefix() {
        let gateway = GeminiGateway::new(GeminiConfig {
            endpoint: "https://example.test/v1beta/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            gateway.build_url("googleai/gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            gateway.build_url("gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_json_request_body() {
        let request = GenerateRequest::new(
            "gemini-2.0-flash",
            OutputSpec::Json {
                schema: serde_json::json!({"type": "OBJECT"}),
            },
        )
        .with_text("hello");

        let body = serde_json::to_value(build_body(request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(body["generationConfig"].get("responseModalities").is_none());
    }

    #[test]
    fn test_speech_request_body() {
        let request = GenerateRequest::new(
            "gemini-2.5-flash-preview-tts",
            OutputSpec::Speech {
                voice: "Kore".to_string(),
            },
        )
        .with_text("Say hello");

        let body = serde_json::to_value(build_body(request)).unwrap();
        let config = &body["generationConfig"];
        assert_eq!(config["responseModalities"][0], "AUDIO");
        assert_eq!(
            config["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
    }

    #[test]
    fn test_media_part_is_inlined() {
        let request = GenerateRequest::new("image-model", OutputSpec::Image)
            .with_media(DataUri::new("image/png", b"abc".to_vec()))
            .with_text("Remove the background");

        let body = serde_json::to_value(build_body(request)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], "YWJj");
        assert_eq!(parts[1]["text"], "Remove the background");
        assert_eq!(body["generationConfig"]["responseModalities"][1], "IMAGE");
    }

    #[test]
    fn test_parse_text_response() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.text.as_deref(), Some("Hello world"));
        assert!(response.media.is_none());
    }

    #[test]
    fn test_parse_inline_media_response() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"Here is your image"},
            {"inlineData":{"mimeType":"image/png","data":"YWJj"}}
        ]}}]}"#;
        let response = parse_response(body).unwrap();
        let media = response.media.unwrap();
        assert_eq!(media.content_type, "image/png");
        assert_eq!(media.source, crate::MediaSource::Inline(b"abc".to_vec()));
    }

    #[test]
    fn test_parse_file_data_response() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"fileData":{"mimeType":"audio/mpeg","fileUri":"https://files.test/a.mp3"}}
        ]}}]}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(
            response.media,
            Some(Media::remote("audio/mpeg", "https://files.test/a.mp3"))
        );
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"message":"model not found","code":404}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[test]
    fn test_parse_empty_candidate() {
        let body = r#"{"candidates":[{"finishReason":"OTHER"}]}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response, GenerateResponse::default());
    }

    #[tokio::test]
    async fn test_fetch_decodes_data_uri_without_network() {
        let gateway = GeminiGateway::new(GeminiConfig::default()).unwrap();
        let fetched = gateway
            .fetch("data:audio/mpeg;base64,YWJj")
            .await
            .unwrap();
        assert_eq!(fetched.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(fetched.bytes, b"abc");
    }
}
