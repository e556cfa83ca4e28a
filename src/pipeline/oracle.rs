//! The vision oracle: image + prompt in, text choices out.
//!
//! [`Oracle`] is the only seam between the analysis pipeline and a model
//! provider. [`LlmOracle`] adapts any `edgequake_llm::LLMProvider`;
//! [`ScriptedOracle`] answers from a closure and records every call, which is
//! what the unit and integration tests drive the pipeline with.

use crate::error::OracleError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Which step of the analysis a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Primary per-slide analysis (carries the slide image).
    SlideAnalysis,
    /// Secondary theme/concept extraction (text only).
    ContextExtraction,
}

/// One call to the oracle.
#[derive(Clone)]
pub struct OracleRequest {
    pub kind: RequestKind,
    pub slide_number: usize,
    pub prompt: String,
    pub image: Option<ImageData>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl fmt::Debug for OracleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleRequest")
            .field("kind", &self.kind)
            .field("slide_number", &self.slide_number)
            .field("prompt_len", &self.prompt.len())
            .field("has_image", &self.image.is_some())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// A single generated alternative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Choice {
    pub text: String,
}

/// What the oracle answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleResponse {
    pub choices: Vec<Choice>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl OracleResponse {
    /// A response with one choice and no token accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice { text: text.into() }],
            ..Default::default()
        }
    }

    /// Text of the first choice, if it has any non-whitespace content.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// External capability that describes an image given a prompt.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn describe(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Oracle backed by an `edgequake_llm` provider.
///
/// The model is fixed when the provider is constructed (see
/// [`crate::orchestrator::resolve_provider`]).
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Provider name, e.g. `openai`.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Model every request is sent to.
    pub fn model(&self) -> &str {
        self.provider.model()
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn describe(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let images: Vec<ImageData> = request.image.iter().cloned().collect();
        let message = ChatMessage::user_with_images(request.prompt.as_str(), images);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&[message], Some(&options))
            .await
            .map_err(|e| OracleError::classify(e.to_string()))?;

        debug!(
            "Slide {} ({:?}, {}/{}): {} input tokens, {} output tokens",
            request.slide_number,
            request.kind,
            self.provider.name(),
            self.provider.model(),
            response.prompt_tokens,
            response.completion_tokens
        );

        Ok(OracleResponse {
            choices: vec![Choice {
                text: response.content,
            }],
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

// ── Scripted oracle ──────────────────────────────────────────────────────

/// What a [`ScriptedOracle`] does for one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer with a single choice.
    Reply(String),
    /// Answer with an empty choice list.
    NoChoices,
    /// Fail with the given error.
    Fail(OracleError),
    /// Sleep, then answer with a single choice.
    Stall(Duration, String),
}

/// A call observed by a [`ScriptedOracle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: RequestKind,
    pub slide_number: usize,
    pub prompt: String,
    pub has_image: bool,
    pub max_tokens: usize,
}

type Script = dyn Fn(&OracleRequest) -> Scripted + Send + Sync;

/// Oracle that answers from a closure and records every request.
pub struct ScriptedOracle {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedOracle {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&OracleRequest) -> Scripted + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Oracle that gives the same reply to every call.
    pub fn always(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Scripted::Reply(reply.clone()))
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn describe(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind: request.kind,
                slide_number: request.slide_number,
                prompt: request.prompt.clone(),
                has_image: request.image.is_some(),
                max_tokens: request.max_tokens,
            });
        }

        match (self.script)(request) {
            Scripted::Reply(text) => Ok(OracleResponse::text(text)),
            Scripted::NoChoices => Ok(OracleResponse::default()),
            Scripted::Fail(e) => Err(e),
            Scripted::Stall(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(OracleResponse::text(text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: RequestKind) -> OracleRequest {
        OracleRequest {
            kind,
            slide_number: 1,
            prompt: "describe".into(),
            image: None,
            max_tokens: 16,
            temperature: 0.0,
        }
    }

    #[test]
    fn first_text_rejects_blank() {
        assert_eq!(OracleResponse::default().first_text(), None);
        assert_eq!(OracleResponse::text("  \n").first_text(), None);
        assert_eq!(OracleResponse::text("ok").first_text(), Some("ok"));
    }

    #[tokio::test]
    async fn scripted_oracle_records_calls() {
        let oracle = ScriptedOracle::new(|req| match req.kind {
            RequestKind::SlideAnalysis => Scripted::Reply("analysis".into()),
            RequestKind::ContextExtraction => {
                Scripted::Fail(OracleError::RateLimited("slow down".into()))
            }
        });

        let ok = oracle.describe(&request(RequestKind::SlideAnalysis)).await;
        assert_eq!(ok.unwrap().first_text(), Some("analysis"));

        let err = oracle.describe(&request(RequestKind::ContextExtraction)).await;
        assert!(matches!(err, Err(OracleError::RateLimited(_))));

        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].kind, RequestKind::ContextExtraction);
        assert!(!calls[0].has_image);
    }

    #[tokio::test]
    async fn llm_oracle_reports_the_provider_model() {
        let provider = Arc::new(edgequake_llm::MockProvider::new());
        provider.add_response("### Summary\nfrom mock").await;
        let oracle = LlmOracle::new(provider);

        assert_eq!(oracle.provider_name(), "mock");
        assert_eq!(oracle.model(), "mock-model");

        let response = oracle.describe(&request(RequestKind::SlideAnalysis)).await.unwrap();
        assert_eq!(response.first_text(), Some("### Summary\nfrom mock"));
    }
}
