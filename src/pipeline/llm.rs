//! Model invocation: send the composed prompt and return the answer text.
//!
//! Two backends implement [`ModelClient`]:
//!
//! * [`GeminiClient`]: talks to the Gemini `generateContent` REST endpoint
//!   directly. Each prompt part maps to one wire part, so the ordering of
//!   question, invoice and instruction reaches the model exactly as composed.
//! * [`ProviderClient`]: wraps any `edgequake_llm` provider (OpenAI,
//!   Anthropic, Ollama, …). Each prompt part becomes one user message.
//!
//! ## No retry
//!
//! A failed call surfaces once as [`ModelInvocationError`]; the user decides
//! whether to resubmit. The only policy is a per-call timeout.

use crate::config::{ApiKey, ServiceConfig};
use crate::error::{InvoiceQaError, ModelInvocationError};
use crate::pipeline::compose::{Part, PromptRequest};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A generative model that answers a [`PromptRequest`] with text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// `provider/model`, for logs and the page footer.
    fn describe(&self) -> String;

    /// Perform exactly one call.
    async fn generate(&self, request: &PromptRequest) -> Result<String, ModelInvocationError>;
}

/// Create the client selected by `config.provider`.
///
/// `"gemini"` uses [`GeminiClient`] with the injected API key. Any other
/// name goes through [`ProviderFactory::create_llm_provider`], which reads
/// that provider's key variable (`OPENAI_API_KEY`, …) itself.
pub fn build_model_client(config: &ServiceConfig) -> Result<Arc<dyn ModelClient>, InvoiceQaError> {
    if config.is_gemini() {
        return Ok(Arc::new(GeminiClient::new(config)?));
    }

    let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model)
        .map_err(|e| InvoiceQaError::ProviderNotConfigured {
            provider: config.provider.clone(),
            hint: format!("{e}"),
        })?;
    Ok(Arc::new(ProviderClient::new(provider, config)))
}

// ── Gemini ───────────────────────────────────────────────────────────────

/// Direct client for Gemini's `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
    generation_config: Option<GenerationConfig>,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, InvoiceQaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| InvoiceQaError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: format!("HTTP client could not be created: {e}"),
            })?;

        let generation_config = if config.temperature.is_some() || config.max_output_tokens.is_some() {
            Some(GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            })
        } else {
            None
        };

        if config.api_key.is_none() {
            warn!("No Gemini API key configured; model calls will fail until one is set");
        }

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            generation_config,
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelInvocationError {
        if e.is_timeout() {
            ModelInvocationError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            ModelInvocationError::Transport(e)
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn describe(&self) -> String {
        format!("gemini/{}", self.model)
    }

    async fn generate(&self, request: &PromptRequest) -> Result<String, ModelInvocationError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelInvocationError::MissingCredential {
                provider: "gemini".into(),
            })?;

        let body = GenerateContentRequest::new(request, self.generation_config.clone());
        let start = Instant::now();

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| truncate(&raw, 200));
            warn!("Gemini returned HTTP {}: {}", status.as_u16(), message);
            return Err(match status.as_u16() {
                401 | 403 => ModelInvocationError::Auth {
                    status: status.as_u16(),
                    message,
                },
                code => ModelInvocationError::Api {
                    status: code,
                    message,
                },
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| ModelInvocationError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini usage: {} prompt tokens, {} candidate tokens",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let answer = answer_text(parsed)?;
        info!(
            "Gemini answered in {}ms ({} chars)",
            start.elapsed().as_millis(),
            answer.len()
        );
        Ok(answer)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

/// Pull the answer out of a successful response.
fn answer_text(response: GenerateContentResponse) -> Result<String, ModelInvocationError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ModelInvocationError::Declined { reason });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ModelInvocationError::Declined {
            reason: candidate
                .finish_reason
                .unwrap_or_else(|| "empty response".to_string()),
        });
    }
    Ok(text)
}

// ── Gemini wire types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(request: &'a PromptRequest, generation_config: Option<GenerationConfig>) -> Self {
        let parts = request
            .parts()
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::Text { text },
                Part::Inline(image) => WirePart::InlineData {
                    inline_data: InlineData {
                        mime_type: &image.mime_type,
                        data: image.to_base64(),
                    },
                },
            })
            .collect();

        Self {
            contents: [Content {
                role: "user",
                parts,
            }],
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Adapter from an `edgequake_llm` provider to [`ModelClient`].
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    timeout_secs: u64,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            label: format!("{}/{}", config.provider, config.model),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens.map(|n| n as usize),
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

/// One user message per prompt part, in order. Images carry empty text.
fn build_messages(request: &PromptRequest) -> Vec<ChatMessage> {
    request
        .parts()
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => ChatMessage::user_with_images(text, vec![]),
            Part::Inline(image) => ChatMessage::user_with_images(
                "",
                vec![ImageData::new(image.to_base64(), image.mime_type.as_str())],
            ),
        })
        .collect()
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn generate(&self, request: &PromptRequest) -> Result<String, ModelInvocationError> {
        let messages = build_messages(request);
        let options = self.build_options();
        let start = Instant::now();

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| ModelInvocationError::Timeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| {
            warn!("{}: call failed: {}", self.label, e);
            ModelInvocationError::Provider(format!("{}", e))
        })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.is_empty() {
            return Err(ModelInvocationError::Declined {
                reason: "empty response".into(),
            });
        }
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose::{compose, ExtractedContent};
    use crate::pipeline::encode::ImagePart;
    use bytes::Bytes;
    use edgequake_llm::traits::ChatRole;
    use edgequake_llm::{LLMResponse, MockProvider};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GEN_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn text_request() -> PromptRequest {
        compose(
            "You are an expert in understanding invoices.",
            "What is the total amount?",
            ExtractedContent::Text("Invoice #1 Total: $42.00".into()),
        )
    }

    fn config_for(server: &MockServer) -> ServiceConfig {
        ServiceConfig::builder()
            .api_base_url(server.uri())
            .api_key("test-key")
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    fn ok_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        })
    }

    #[test]
    fn wire_body_keeps_part_order_for_text() {
        let req = text_request();
        let body = serde_json::to_value(GenerateContentRequest::new(&req, None)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "What is the total amount?" },
                        { "text": "Invoice #1 Total: $42.00" },
                        { "text": "You are an expert in understanding invoices." }
                    ]
                }]
            })
        );
    }

    #[test]
    fn wire_body_inlines_image_as_second_part() {
        let req = compose(
            "instr",
            "Who is the buyer?",
            ExtractedContent::Image(ImagePart {
                mime_type: "image/jpeg".into(),
                bytes: Bytes::from_static(b"\xFF\xD8\xFF"),
            }),
        );
        let body = serde_json::to_value(GenerateContentRequest::new(&req, None)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0], json!({ "text": "Who is the buyer?" }));
        assert_eq!(
            parts[1],
            json!({ "inlineData": { "mimeType": "image/jpeg", "data": "/9j/" } })
        );
        assert_eq!(parts[2], json!({ "text": "instr" }));
    }

    #[test]
    fn generation_config_serialised_camel_case() {
        let req = text_request();
        let cfg = GenerationConfig {
            temperature: Some(0.2),
            max_output_tokens: Some(512),
        };
        let body = serde_json::to_value(GenerateContentRequest::new(&req, Some(cfg))).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(512));
    }

    #[test]
    fn answer_concatenates_parts() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "$42" }, { "text": ".00" }] } }]
        }))
        .unwrap();
        assert_eq!(answer_text(resp).unwrap(), "$42.00");
    }

    #[test]
    fn blocked_prompt_is_declined() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        match answer_text(resp) {
            Err(ModelInvocationError::Declined { reason }) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Declined, got {other:?}"),
        }
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "MAX_TOKENS" }]
        }))
        .unwrap();
        match answer_text(resp) {
            Err(ModelInvocationError::Declined { reason }) => assert_eq!(reason, "MAX_TOKENS"),
            other => panic!("expected Declined, got {other:?}"),
        }
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé\u{2026}");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[tokio::test]
    async fn gemini_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("$42.00")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config_for(&server)).unwrap();
        let answer = client.generate(&text_request()).await.unwrap();
        assert_eq!(answer, "$42.00");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(
            body["contents"][0]["parts"][1]["text"],
            json!("Invoice #1 Total: $42.00")
        );
    }

    #[tokio::test]
    async fn gemini_forbidden_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config_for(&server)).unwrap();
        match client.generate(&text_request()).await {
            Err(ModelInvocationError::Auth { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gemini_server_error_keeps_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config_for(&server)).unwrap();
        match client.generate(&text_request()).await {
            Err(ModelInvocationError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream overloaded");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gemini_garbage_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config_for(&server)).unwrap();
        assert!(matches!(
            client.generate(&text_request()).await,
            Err(ModelInvocationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn gemini_without_key_never_calls_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let config = ServiceConfig::builder()
            .api_base_url(server.uri())
            .build()
            .unwrap();
        let client = GeminiClient::new(&config).unwrap();
        assert!(matches!(
            client.generate(&text_request()).await,
            Err(ModelInvocationError::MissingCredential { .. })
        ));
    }

    #[tokio::test]
    async fn gemini_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new(&config_for(&server)).unwrap();
        match client.generate(&text_request()).await {
            Err(ModelInvocationError::Timeout { secs }) => assert_eq!(secs, 1),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn describe_names_model() {
        let config = ServiceConfig::default();
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.describe(), "gemini/gemini-1.5-flash");
    }

    // ── edgequake-llm backend ────────────────────────────────────────────

    fn mock_config() -> ServiceConfig {
        ServiceConfig::builder()
            .provider("mock")
            .model("mock-model")
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    fn image_request() -> PromptRequest {
        compose(
            "instr",
            "Who is the buyer?",
            ExtractedContent::Image(ImagePart {
                mime_type: "image/jpeg".into(),
                bytes: Bytes::from_static(b"\xFF\xD8\xFF"),
            }),
        )
    }

    #[test]
    fn messages_follow_part_order_for_text() {
        let messages = build_messages(&text_request());
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            [
                "What is the total amount?",
                "Invoice #1 Total: $42.00",
                "You are an expert in understanding invoices.",
            ]
        );
        assert!(messages.iter().all(|m| m.role == ChatRole::User));
        assert!(messages.iter().all(|m| m.images.is_none()));
    }

    #[test]
    fn image_becomes_second_message() {
        let messages = build_messages(&image_request());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "Who is the buyer?");
        assert_eq!(messages[2].content, "instr");

        assert_eq!(messages[1].content, "");
        let images = messages[1].images.as_ref().expect("image attached");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[0].data, "/9j/");
    }

    #[tokio::test]
    async fn provider_client_returns_mock_answer() {
        let mock = MockProvider::new();
        mock.add_response("$42.00").await;
        let client = ProviderClient::new(Arc::new(mock), &mock_config());

        assert_eq!(client.describe(), "mock/mock-model");
        let answer = client.generate(&image_request()).await.unwrap();
        assert_eq!(answer, "$42.00");
    }

    #[tokio::test]
    async fn provider_client_empty_reply_is_declined() {
        let mock = MockProvider::new();
        mock.add_response("").await;
        let client = ProviderClient::new(Arc::new(mock), &mock_config());

        match client.generate(&text_request()).await {
            Err(ModelInvocationError::Declined { reason }) => assert_eq!(reason, "empty response"),
            other => panic!("expected Declined, got {other:?}"),
        }
    }

    /// Answers only after `delay`.
    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait]
    impl LLMProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "slow-model"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(LLMResponse::new("late", "slow-model"))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete("").await
        }
    }

    #[tokio::test]
    async fn provider_client_slow_call_times_out() {
        let slow = SlowProvider {
            delay: Duration::from_secs(3),
        };
        let client = ProviderClient::new(Arc::new(slow), &mock_config());

        match client.generate(&text_request()).await {
            Err(ModelInvocationError::Timeout { secs }) => assert_eq!(secs, 1),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
