mod client;
pub(crate) mod types;

use std::time::Duration;

use tracing::warn;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;
use client::OpenAiClient;
use types::{ChatRequest, JsonSchemaFormat, ResponseFormat, WireMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completion agent for any OpenAI-compatible endpoint (OpenAI,
/// OpenRouter, Azure-style proxies). Endpoint, key and model are all
/// mandatory.
#[derive(Clone)]
pub struct OpenAi {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let api_key = api_key.into();
        let model = model.into();
        for (name, value) in [("base URL", &base_url), ("API key", &api_key), ("model", &model)] {
            if value.trim().is_empty() {
                return Err(AiError::Config(format!("missing {name}")));
            }
        }
        Ok(Self {
            base_url,
            api_key,
            model,
            timeout: DEFAULT_TIMEOUT,
            http: reqwest::Client::new(),
        })
    }

    /// Hard ceiling for a single call, enforced by cancelling the request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self) -> OpenAiClient {
        OpenAiClient::new(self.http.clone(), &self.api_key, &self.base_url)
    }

    async fn send(&self, request: ChatRequest) -> Result<String> {
        let client = self.client();
        match tokio::time::timeout(self.timeout, client.chat(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model = %self.model, timeout = ?self.timeout, "Chat completion timed out");
                Err(AiError::Timeout(self.timeout))
            }
        }
    }

    /// Plain chat completion.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user));
        self.send(request).await
    }

    /// Chat completion constrained to a strict JSON schema. Returns the raw
    /// content so callers can apply their own repair before deserializing.
    pub async fn structured_output(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .response_format(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: name.to_string(),
                    strict: true,
                    schema,
                },
            });
        self.send(request).await
    }

    /// Chat completion in JSON mode, for endpoints without schema support.
    pub async fn json_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user))
            .response_format(ResponseFormat::JsonObject);
        self.send(request).await
    }

    /// Typed structured output.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<T> {
        let raw = self
            .structured_output(system, user, &T::type_name(), T::openai_schema())
            .await?;
        serde_json::from_str(crate::util::strip_code_blocks(&raw))
            .map_err(|e| AiError::Parse(format!("failed to deserialize {}: {e}", T::type_name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_are_configuration_errors() {
        assert!(matches!(
            OpenAi::new("", "sk-test", "gpt-4o-mini"),
            Err(AiError::Config(_))
        ));
        assert!(matches!(
            OpenAi::new("https://api.openai.com/v1", " ", "gpt-4o-mini"),
            Err(AiError::Config(_))
        ));
        assert!(matches!(
            OpenAi::new("https://api.openai.com/v1", "sk-test", ""),
            Err(AiError::Config(_))
        ));
    }

    #[test]
    fn builder_overrides_timeout() {
        let ai = OpenAi::new("https://api.openai.com/v1", "sk-test", "gpt-4o-mini")
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ai.timeout(), Duration::from_secs(5));
        assert_eq!(ai.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_network_error() {
        let ai = OpenAi::new("http://127.0.0.1:9", "sk-test", "gpt-4o-mini")
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        let err = ai.chat_completion("system", "user").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
