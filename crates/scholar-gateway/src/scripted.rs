//! In-memory gateway that replays queued responses.
//!
//! Responses are queued per model name and consumed in FIFO order. Every
//! request is recorded so callers can assert on what was sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    FetchedMedia, GatewayError, GatewayErrorKind, GenerateRequest, GenerateResponse, Media,
    ModelGateway,
};

#[derive(Debug, Default)]
struct Script {
    queues: HashMap<String, VecDeque<Result<GenerateResponse, (GatewayErrorKind, String)>>>,
    remote: HashMap<String, FetchedMedia>,
    requests: Vec<GenerateRequest>,
}

/// A [`ModelGateway`] backed by queued responses.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, model: &str, entry: Result<GenerateResponse, (GatewayErrorKind, String)>) {
        self.lock()
            .queues
            .entry(model.to_string())
            .or_default()
            .push_back(entry);
    }

    /// Queues a text response.
    pub fn push_text(&self, model: &str, text: impl Into<String>) {
        self.push(model, Ok(GenerateResponse::text(text)));
    }

    /// Queues a JSON response, serialized to text.
    pub fn push_json(&self, model: &str, value: &serde_json::Value) {
        self.push(model, Ok(GenerateResponse::text(value.to_string())));
    }

    /// Queues an inline image response.
    pub fn push_image(&self, model: &str, content_type: &str, bytes: Vec<u8>) {
        self.push_media(model, Media::inline(content_type, bytes));
    }

    /// Queues an arbitrary media response.
    pub fn push_media(&self, model: &str, media: Media) {
        self.push(model, Ok(GenerateResponse::media(media)));
    }

    /// Queues a response with neither text nor media.
    pub fn push_empty(&self, model: &str) {
        self.push(model, Ok(GenerateResponse::default()));
    }

    /// Queues a provider failure.
    pub fn push_failure(&self, model: &str, kind: GatewayErrorKind, message: impl Into<String>) {
        self.push(model, Err((kind, message.into())));
    }

    /// Makes `url` fetchable with the given payload.
    pub fn serve_remote(&self, url: &str, content_type: Option<&str>, bytes: Vec<u8>) {
        self.lock().remote.insert(
            url.to_string(),
            FetchedMedia {
                content_type: content_type.map(ToString::to_string),
                bytes,
            },
        );
    }

    /// All requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received for `model`.
    #[must_use]
    pub fn request_count(&self, model: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.model == model)
            .count()
    }

    /// Number of queued responses not yet consumed, across all models.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queues.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        let mut script = self.lock();
        let model = request.model.clone();
        script.requests.push(request);

        let entry = script
            .queues
            .get_mut(&model)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| GatewayError::ScriptExhausted(model.clone()))?;
        drop(script);

        debug!(model = %model, ok = entry.is_ok(), "Replaying scripted response");
        entry.map_err(|(kind, message)| GatewayError::request(kind, message))
    }

    async fn fetch(&self, url: &str) -> Result<FetchedMedia, GatewayError> {
        if url.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
            let uri: crate::DataUri = url.parse()?;
            return Ok(FetchedMedia {
                content_type: Some(uri.media_type().to_string()),
                bytes: uri.into_data(),
            });
        }
        self.lock()
            .remote
            .get(url)
            .cloned()
            .ok_or_else(|| GatewayError::fetch(url, "HTTP 404 Not Found"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::OutputSpec;

    #[tokio::test]
    async fn test_responses_are_fifo_per_model() {
        let gateway = ScriptedGateway::new();
        gateway.push_text("text", "first");
        gateway.push_text("text", "second");
        gateway.push_image("image", "image/png", vec![1]);

        let first = gateway
            .generate(GenerateRequest::new("text", OutputSpec::Text))
            .await
            .unwrap();
        let image = gateway
            .generate(GenerateRequest::new("image", OutputSpec::Image))
            .await
            .unwrap();
        let second = gateway
            .generate(GenerateRequest::new("text", OutputSpec::Text))
            .await
            .unwrap();

        assert_eq!(first.text.as_deref(), Some("first"));
        assert_eq!(second.text.as_deref(), Some("second"));
        assert_eq!(image.media, Some(Media::inline("image/png", vec![1])));
        assert_eq!(gateway.request_count("text"), 2);
        assert_eq!(gateway.pending(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let gateway = ScriptedGateway::new();
        let err = gateway
            .generate(GenerateRequest::new("text", OutputSpec::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ScriptExhausted(ref m) if m == "text"));
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_replayed() {
        let gateway = ScriptedGateway::new();
        gateway.push_failure("text", GatewayErrorKind::RateLimit, "quota exceeded");

        let err = gateway
            .generate(GenerateRequest::new("text", OutputSpec::Text))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(GatewayErrorKind::RateLimit));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_fetch_serves_registered_urls() {
        let gateway = ScriptedGateway::new();
        gateway.serve_remote("https://media.test/a.mp3", Some("audio/mpeg"), vec![9, 9]);

        let fetched = gateway.fetch("https://media.test/a.mp3").await.unwrap();
        assert_eq!(fetched.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(fetched.bytes, vec![9, 9]);

        let err = gateway.fetch("https://media.test/missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_decodes_data_uri() {
        let gateway = ScriptedGateway::new();
        let fetched = gateway.fetch("data:audio/wav;base64,YWJj").await.unwrap();
        assert_eq!(fetched.bytes, b"abc");
    }
}
