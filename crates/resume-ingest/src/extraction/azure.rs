use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ConfigError;
use crate::sanitize;

use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImageUrl,
    MessageContent,
};
use super::{ExtractionBackend, ExtractionError, ExtractionInput, FieldSchema, Strategy};

/// Per-request knobs shared by both strategies.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub text_timeout: Duration,
    pub vision_timeout: Duration,
}

impl From<&ExtractionConfig> for RequestSettings {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            text_timeout: config.text_timeout(),
            vision_timeout: config.vision_timeout(),
        }
    }
}

/// Azure OpenAI chat-completions backend authenticated with an `api-key` header.
pub struct AzureOpenAiBackend {
    endpoint: String,
    api_key: SecretString,
    settings: RequestSettings,
    client: reqwest::Client,
}

impl AzureOpenAiBackend {
    pub fn new(endpoint: String, api_key: SecretString, settings: RequestSettings) -> Self {
        Self {
            endpoint,
            api_key,
            settings,
            client: reqwest::Client::new(),
        }
    }

    /// Builds the backend from config, or `None` when the endpoint or key is absent.
    pub fn from_config(config: &ExtractionConfig) -> Result<Option<Self>, ConfigError> {
        let Some(endpoint) = config.resolve_endpoint() else {
            return Ok(None);
        };
        let Some(api_key) = config.resolve_api_key()? else {
            return Ok(None);
        };
        Ok(Some(Self::new(endpoint, api_key, RequestSettings::from(config))))
    }

    fn timeout_for(&self, strategy: Strategy) -> Duration {
        match strategy {
            Strategy::Text => self.settings.text_timeout,
            Strategy::Vision => self.settings.vision_timeout,
        }
    }

    pub(crate) fn build_request(
        &self,
        input: ExtractionInput<'_>,
        schema: &FieldSchema,
    ) -> ChatCompletionRequest {
        let user_content = match input {
            ExtractionInput::Text(text) => MessageContent::Text(schema.text_prompt(text)),
            ExtractionInput::Pages(pages) => {
                let mut parts = Vec::with_capacity(pages.len() + 1);
                parts.push(ContentPart::Text {
                    text: schema.vision_prompt(pages.len()),
                });
                parts.extend(pages.iter().map(|page| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", page.mime_type, STANDARD.encode(&page.bytes)),
                        detail: Some("high"),
                    },
                }));
                MessageContent::Parts(parts)
            }
        };

        ChatCompletionRequest {
            messages: vec![
                ChatMessage::system(schema.system_prompt.clone()),
                ChatMessage::user(user_content),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }
}

#[async_trait]
impl ExtractionBackend for AzureOpenAiBackend {
    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        schema: &FieldSchema,
    ) -> Result<String, ExtractionError> {
        let strategy = input.strategy();
        let timeout = self.timeout_for(strategy);
        let request = self.build_request(input, schema);

        debug!(strategy = %strategy, timeout_secs = timeout.as_secs(), "Sending extraction request");

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ExtractionError::Timeout {
                    strategy,
                    after: timeout,
                }
            } else {
                ExtractionError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", self.api_key.expose_secret())
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body: sanitize::excerpt(&body, 500),
            });
        }

        let body = response.text().await.map_err(classify)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ExtractionError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}
