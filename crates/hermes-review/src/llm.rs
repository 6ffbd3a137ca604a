use std::time::Duration;

use async_trait::async_trait;
use hermes_core::{HermesError, LlmConfig};
use serde::{Deserialize, Serialize};

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use hermes_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Review this code");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use hermes_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Anything that can turn a chat prompt into completion text.
///
/// [`LlmClient`] is the production implementation; the review pipeline only
/// depends on this trait.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Submit `messages` and return the first choice's message content.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, HermesError>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use hermes_core::LlmConfig;
/// use hermes_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o-mini");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, HermesError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| HermesError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        format!("{base_url}/v1/chat/completions")
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "store": self.config.store,
            "messages": messages,
        })
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Llm`] on HTTP errors or response parsing failures.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, HermesError> {
        let url = self.endpoint();
        let body = self.request_body(&messages);

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        tracing::debug!(model = %self.config.model, url = %url, "sending completion request");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| HermesError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(HermesError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HermesError::Llm(format!("failed to parse response: {e}")))?;

        extract_message_content(&response_body)
    }
}

#[async_trait]
impl CompletionApi for LlmClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, HermesError> {
        self.chat(messages).await
    }
}

/// Pull `choices[0].message.content` out of a chat completion response.
///
/// # Errors
///
/// Returns [`HermesError::Llm`] if the response has no usable first choice.
///
/// # Examples
///
/// ```
/// use hermes_review::llm::extract_message_content;
///
/// let body = serde_json::json!({
///     "choices": [{ "message": { "role": "assistant", "content": "Looks good." } }]
/// });
/// assert_eq!(extract_message_content(&body).unwrap(), "Looks good.");
/// ```
pub fn extract_message_content(response_body: &serde_json::Value) -> Result<String, HermesError> {
    let content = response_body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            HermesError::Llm(format!("unexpected response structure: {response_body}"))
        })?;

    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::LlmConfig;

    #[test]
    fn client_construction_succeeds() {
        let config = LlmConfig::default();
        let client = LlmClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn model_returns_config_model() {
        let config = LlmConfig {
            model: "gpt-4o".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn endpoint_respects_base_url() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/".into()),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");

        let client = LlmClient::new(&LlmConfig::default()).unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn request_body_carries_model_store_and_messages() {
        let client = LlmClient::new(&LlmConfig::default()).unwrap();
        let body = client.request_body(&[ChatMessage::user("hi")]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["store"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn chat_message_serializes() {
        let msg = ChatMessage {
            role: Role::System,
            content: "hello".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn extract_uses_first_choice() {
        let body = serde_json::json!({
            "choices": [
                { "message": { "content": "first" } },
                { "message": { "content": "second" } }
            ]
        });
        assert_eq!(extract_message_content(&body).unwrap(), "first");
    }

    #[test]
    fn extract_rejects_empty_choices() {
        let body = serde_json::json!({ "choices": [] });
        let err = extract_message_content(&body).unwrap_err();
        assert!(matches!(err, HermesError::Llm(_)));
    }

    #[test]
    fn extract_rejects_null_content() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": null, "refusal": "no" } }]
        });
        assert!(extract_message_content(&body).is_err());
    }
}
