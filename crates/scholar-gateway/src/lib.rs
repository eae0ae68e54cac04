//! Scholar Model Gateway
//!
//! Boundary to the hosted generative-model provider.
//!
//! Every generation step issues exactly one [`ModelGateway::generate`] call
//! identified by a model name and a request payload (prompt text and/or input
//! media plus a declared output shape). Responses carry either text, inline
//! media, or a reference to a fetchable resource that
//! [`ModelGateway::fetch`] can retrieve.
//!
//! Two implementations are provided:
//!
//! - [`gemini::GeminiGateway`] talks to the Gemini `generateContent` REST API.
//! - [`scripted::ScriptedGateway`] replays queued responses from memory.

pub mod data_uri;
pub mod gemini;
pub mod scripted;

pub use data_uri::DataUri;
pub use gemini::{GeminiConfig, GeminiGateway};
pub use scripted::ScriptedGateway;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the model provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// No API key was configured.
    #[error("missing API key: set the {env_var} environment variable")]
    MissingApiKey {
        /// Environment variable that was consulted.
        env_var: String,
    },

    /// The provider rejected the request or could not be reached.
    #[error("model request failed ({kind}): {message}")]
    Request {
        /// Classification of the failure.
        kind: GatewayErrorKind,
        /// Details reported by the provider or transport.
        message: String,
    },

    /// The provider answered with a body we could not interpret.
    #[error("unexpected model response: {0}")]
    InvalidResponse(String),

    /// A referenced media resource could not be retrieved.
    #[error("failed to fetch media from '{url}': {message}")]
    Fetch {
        /// The resource location.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A data URI was malformed.
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    /// The scripted gateway ran out of responses for a model.
    #[error("no scripted response left for model '{0}'")]
    ScriptExhausted(String),
}

impl GatewayError {
    /// Creates a new `Request` error.
    #[must_use]
    pub fn request(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self::Request {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `Fetch` error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the failure classification, if this is a request error.
    #[must_use]
    pub const fn kind(&self) -> Option<GatewayErrorKind> {
        match self {
            Self::Request { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Categories of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Invalid or missing credentials.
    Authentication,
    /// Quota or rate limit exceeded.
    RateLimit,
    /// Provider-side failure (5xx).
    Server,
    /// Connectivity problem or timeout.
    Network,
    /// Anything else (bad request, blocked prompt, ...).
    Other,
}

impl GatewayErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this kind of failure.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key",
            Self::RateLimit => "Wait a moment and submit again",
            Self::Server => "The model service may be having issues; try again later",
            Self::Network => "Check your network connection",
            Self::Other => "Check the model name and request in your configuration",
        }
    }
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One piece of request input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Prompt text.
    Text(String),
    /// Inline media (for example an image to edit).
    Media(DataUri),
}

/// The response shape a request asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    /// Free-form text.
    Text,
    /// JSON text conforming to the given schema.
    Json {
        /// Response schema in the provider's schema dialect.
        schema: serde_json::Value,
    },
    /// An image (text parts may accompany it).
    Image,
    /// Synthesized speech.
    Speech {
        /// Prebuilt voice name.
        voice: String,
    },
}

/// A single model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered input parts.
    pub parts: Vec<Part>,
    /// Declared response shape.
    pub output: OutputSpec,
}

impl GenerateRequest {
    /// Creates a request with no input parts.
    #[must_use]
    pub fn new(model: impl Into<String>, output: OutputSpec) -> Self {
        Self {
            model: model.into(),
            parts: Vec::new(),
            output,
        }
    }

    /// Appends a text part.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    /// Appends an inline media part.
    #[must_use]
    pub fn with_media(mut self, media: DataUri) -> Self {
        self.parts.push(Part::Media(media));
        self
    }

    /// Returns all text parts joined by blank lines.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::Media(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Where a media payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Raw bytes delivered with the response.
    Inline(Vec<u8>),
    /// A resource that must be fetched.
    Remote(String),
}

/// Media returned by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// Declared media type, possibly with parameters.
    pub content_type: String,
    /// Payload location.
    pub source: MediaSource,
}

impl Media {
    /// Creates inline media.
    #[must_use]
    pub fn inline(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            source: MediaSource::Inline(bytes),
        }
    }

    /// Creates a reference to remote media.
    #[must_use]
    pub fn remote(content_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            source: MediaSource::Remote(url.into()),
        }
    }
}

/// Result of a model invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResponse {
    /// Concatenated text output, if any.
    pub text: Option<String>,
    /// First media output, if any.
    pub media: Option<Media>,
}

impl GenerateResponse {
    /// A text-only response.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media: None,
        }
    }

    /// A media-only response.
    #[must_use]
    pub const fn media(media: Media) -> Self {
        Self {
            text: None,
            media: Some(media),
        }
    }
}

/// Bytes retrieved from a remote media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// `Content-Type` reported by the resource, if any.
    pub content_type: Option<String>,
    /// The payload.
    pub bytes: Vec<u8>,
}

/// The generative-model service boundary.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Invokes a model.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GatewayError>;

    /// Retrieves a media resource referenced by a previous response.
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, GatewayError>;
}

#[async_trait]
impl<G: ModelGateway + ?Sized> ModelGateway for std::sync::Arc<G> {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        (**self).generate(request).await
    }

    async fn fetch(&self, url: &str) -> Result<FetchedMedia, GatewayError> {
        (**self).fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_status() {
        assert_eq!(
            GatewayErrorKind::from_status(401),
            GatewayErrorKind::Authentication
        );
        assert_eq!(
            GatewayErrorKind::from_status(403),
            GatewayErrorKind::Authentication
        );
        assert_eq!(
            GatewayErrorKind::from_status(429),
            GatewayErrorKind::RateLimit
        );
        assert_eq!(GatewayErrorKind::from_status(503), GatewayErrorKind::Server);
        assert_eq!(GatewayErrorKind::from_status(400), GatewayErrorKind::Other);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(GatewayErrorKind::RateLimit.to_string(), "rate_limit");
        assert_eq!(GatewayErrorKind::Network.to_string(), "network");
    }

    #[test]
    fn test_request_error_message_includes_kind() {
        let err = GatewayError::request(GatewayErrorKind::Server, "HTTP 503");
        assert_eq!(err.kind(), Some(GatewayErrorKind::Server));
        assert!(err.to_string().contains("server"));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_prompt_text_skips_media_parts() {
        let media = DataUri::new("image/png", vec![1, 2, 3]);
        let request = GenerateRequest::new("model", OutputSpec::Image)
            .with_media(media)
            .with_text("first")
            .with_text("second");

        assert_eq!(request.parts.len(), 3);
        assert_eq!(request.prompt_text(), "first\n\nsecond");
    }
}
