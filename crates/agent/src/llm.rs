use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use concierge_core::config::LlmConfig;
use concierge_core::domain::conversation::Message;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("language model provider unavailable: {0}")]
    Unavailable(String),
    #[error("language model provider timed out: {0}")]
    Timeout(String),
    #[error("language model provider rejected credentials: {0}")]
    Auth(String),
    #[error("language model provider returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Ask the provider for a single JSON object.
    Json,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub mode: CompletionMode,
}

impl CompletionRequest {
    pub fn new(system_prompt: &str, user_payload: String, mode: CompletionMode) -> Self {
        Self { messages: vec![Message::system(system_prompt), Message::user(user_payload)], mode }
    }
}

/// Chat-completion transport. Returns the first choice's content, `""` when
/// the provider sends none.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Client for any provider exposing the OpenAI `chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    json_temperature: f64,
    text_temperature: f64,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_none() {
            warn!(
                event_name = "agent.llm.api_key_missing",
                model = %config.model,
                "llm api key is not set; calls to keyed providers will fail"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| ProviderError::Unavailable(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            json_temperature: config.json_temperature,
            text_temperature: config.text_temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let temperature = match request.mode {
            CompletionMode::Json => self.json_temperature,
            CompletionMode::Text => self.text_temperature,
        };

        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": &request.messages,
            "temperature": temperature,
        });

        if request.mode == CompletionMode::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        body
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        debug!(
            event_name = "agent.llm.request",
            mode = ?request.mode,
            model = %self.model,
            "calling language model provider"
        );

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&self.request_body(&request));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                ProviderError::Timeout(error.to_string())
            } else {
                ProviderError::Unavailable(error.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview = body.chars().take(200).collect::<String>();
            return Err(ProviderError::Unavailable(format!("HTTP {status}: {preview}")));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                ProviderError::Timeout(error.to_string())
            } else {
                ProviderError::InvalidResponse(error.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("response had no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        debug!(
            event_name = "agent.llm.response",
            length = content.len(),
            "language model response received"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use concierge_core::config::{LlmConfig, LlmProvider};

    use super::{ChatClient, CompletionMode, CompletionRequest, OpenAiCompatibleClient, ProviderError};

    fn config_for(server: &MockServer, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: api_key.map(|key| key.to_string().into()),
            base_url: Some(format!("{}/v1", server.uri())),
            model: "test-model".to_string(),
            timeout_secs: 5,
            json_temperature: 0.1,
            text_temperature: 0.3,
        }
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[tokio::test]
    async fn json_mode_requests_json_object_at_low_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "temperature": 0.1,
                "response_format": { "type": "json_object" },
                "messages": [ { "role": "system" }, { "role": "user" } ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("{}"))))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            OpenAiCompatibleClient::from_config(&config_for(&server, Some("sk-test"))).expect("client");
        let content = client
            .complete(CompletionRequest::new("system", "{}".to_string(), CompletionMode::Json))
            .await
            .expect("completion");

        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn null_content_is_treated_as_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!(null))))
            .mount(&server)
            .await;

        let client =
            OpenAiCompatibleClient::from_config(&config_for(&server, Some("sk-test"))).expect("client");
        let content = client
            .complete(CompletionRequest::new("system", "hi".to_string(), CompletionMode::Text))
            .await
            .expect("completion");

        assert_eq!(content, "");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client =
            OpenAiCompatibleClient::from_config(&config_for(&server, Some("sk-bad"))).expect("client");
        let error = client
            .complete(CompletionRequest::new("system", "hi".to_string(), CompletionMode::Text))
            .await
            .expect_err("401 must fail");

        assert!(matches!(error, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::from_config(&config_for(&server, None)).expect("client");
        let error = client
            .complete(CompletionRequest::new("system", "hi".to_string(), CompletionMode::Text))
            .await
            .expect_err("503 must fail");

        assert!(matches!(error, ProviderError::Unavailable(ref message) if message.contains("503")));
    }

    #[tokio::test]
    async fn slow_provider_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(json!("late")))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, Some("sk-test"));
        config.timeout_secs = 1;
        let client = OpenAiCompatibleClient::from_config(&config).expect("client");
        let error = client
            .complete(CompletionRequest::new("system", "hi".to_string(), CompletionMode::Text))
            .await
            .expect_err("must time out");

        assert!(matches!(error, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client =
            OpenAiCompatibleClient::from_config(&config_for(&server, Some("sk-test"))).expect("client");
        let error = client
            .complete(CompletionRequest::new("system", "hi".to_string(), CompletionMode::Text))
            .await
            .expect_err("no choices");

        assert!(matches!(error, ProviderError::InvalidResponse(_)));
    }
}
