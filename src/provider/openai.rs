//! OpenAI backend, wrapping `async_openai::Client` the way the
//! teacher's `agent` feature declares the dependency (`Cargo.toml`'s
//! `async-openai = { version = "0.27", optional = true }` under the `agent`
//! feature set) — the SDK's native `response_format: json_schema` support
//! covers structured output without hand-rolling request bodies the way
//! [`super::gemini`] has to.

use super::{GenerationParams, Message, Provider, Role};
use crate::error::ProviderError;
use crate::schema::WireSchema;
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use serde_json::Value;

/// OpenAI backend adapter.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Builds a client from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCredentials`] if the variable is unset.
    pub fn from_env() -> Result<Self, ProviderError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| ProviderError::MissingCredentials("openai".to_string()))?;
        Ok(Self::new(key))
    }

    /// Builds a client from an explicit API key (tests, programmatic use).
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
        }
    }

    fn build_messages(messages: &[Message]) -> Result<Vec<async_openai::types::ChatCompletionRequestMessage>, ProviderError> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Transport(e.to_string())),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Transport(e.to_string())),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Transport(e.to_string())),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_text(&self, model: &str, messages: &[Message], params: GenerationParams) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(Self::build_messages(messages)?)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| ProviderError::Transport(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or_else(|| ProviderError::Api {
            status: 0,
            message: format!("OpenAI returned no choices for model {model}"),
        })?;
        let content = choice.message.content.ok_or_else(|| ProviderError::Api {
            status: 0,
            message: format!("OpenAI returned an empty message for model {model}"),
        })?;
        Ok(super::mojibake::scan_and_repair(&content))
    }

    async fn generate_structured(
        &self,
        model: &str,
        messages: &[Message],
        schema: &WireSchema,
        params: GenerationParams,
    ) -> Result<Value, ProviderError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: "enrichment_output".to_string(),
                schema: Some(schema.to_json_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(Self::build_messages(messages)?)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .response_format(response_format)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| ProviderError::Transport(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or_else(|| ProviderError::Api {
            status: 0,
            message: format!("OpenAI returned no choices for model {model}"),
        })?;
        let content = choice.message.content.ok_or_else(|| ProviderError::Api {
            status: 0,
            message: format!("OpenAI returned an empty message for model {model}"),
        })?;
        let content = super::mojibake::scan_and_repair(&content);

        serde_json::from_str(&content).map_err(|e| ProviderError::Api {
            status: 0,
            message: format!("OpenAI structured response was not valid JSON: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_maps_roles() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let built = OpenAiProvider::build_messages(&messages).unwrap();
        assert_eq!(built.len(), 2);
    }
}
