//! Gemini backend, grounded in `grafbase-nexus`'s
//! `crates/llm/src/provider/google.rs`: a raw `reqwest` client against
//! `generativelanguage.googleapis.com`, since there is no first-party
//! Google Rust SDK in the pack's dependency set.

use super::{GenerationParams, Message, Provider, Role};
use crate::error::ProviderError;
use crate::schema::WireSchema;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend adapter.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl GeminiProvider {
    /// Builds a client from an API key read from `GEMINI_API_KEY` or
    /// `GOOGLE_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCredentials`] if neither environment
    /// variable is set.
    pub fn from_env() -> Result<Self, ProviderError> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| ProviderError::MissingCredentials("gemini".to_string()))?;
        Ok(Self::new(key))
    }

    /// Builds a client from an explicit API key (tests, programmatic use).
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::from(api_key.into()),
        }
    }

    fn messages_to_contents(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_instruction = None;
        let mut contents = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    system_instruction = Some(json!({"parts": [{"text": message.content}]}));
                }
                Role::User => contents.push(json!({"role": "user", "parts": [{"text": message.content}]})),
                Role::Assistant => contents.push(json!({"role": "model", "parts": [{"text": message.content}]})),
            }
        }
        (system_instruction, contents)
    }

    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        params: GenerationParams,
        response_schema: Option<Value>,
    ) -> Result<Value, ProviderError> {
        let (system_instruction, contents) = Self::messages_to_contents(messages);

        let mut generation_config = json!({
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        });
        if let Some(schema) = response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema;
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(system_instruction) = system_instruction {
            body["systemInstruction"] = system_instruction;
        }

        let url = format!(
            "{}/models/{model}:generateContent?key={}",
            self.base_url,
            self.api_key.expose_secret()
        );

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await?;
        extract_text(&payload)
    }
}

fn extract_text(payload: &Value) -> Result<Value, ProviderError> {
    let text = payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| ProviderError::Api {
            status: 0,
            message: format!("unexpected Gemini response shape: {payload}"),
        })?;
    Ok(Value::String(text.to_string()))
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_text(&self, model: &str, messages: &[Message], params: GenerationParams) -> Result<String, ProviderError> {
        let value = self.generate(model, messages, params, None).await?;
        Ok(super::mojibake::scan_and_repair(value.as_str().unwrap_or_default()))
    }

    async fn generate_structured(
        &self,
        model: &str,
        messages: &[Message],
        schema: &WireSchema,
        params: GenerationParams,
    ) -> Result<Value, ProviderError> {
        let wire_schema = gemini_response_schema(schema);
        let value = self.generate(model, messages, params, Some(wire_schema)).await?;
        let text = super::mojibake::scan_and_repair(value.as_str().unwrap_or_default());
        serde_json::from_str(&text).map_err(|e| ProviderError::Api {
            status: 0,
            message: format!("Gemini structured response was not valid JSON: {e}"),
        })
    }
}

/// Gemini's `responseSchema` is a subset of OpenAPI 3.0 schema, not full
/// JSON Schema (notably: no `additionalProperties`). Strips the keys
/// Gemini rejects from the otherwise-shared [`WireSchema`] rendering.
fn gemini_response_schema(schema: &WireSchema) -> Value {
    let mut value = schema.to_json_schema();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("additionalProperties");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{compile_schema, RawSchema};

    #[test]
    fn strips_additional_properties_for_gemini() {
        let raw: RawSchema = serde_yaml::from_str("sentiment:\n  enum: [positive, negative]").unwrap();
        let compiled = compile_schema(&raw).unwrap();
        let wire = WireSchema::from_compiled(&compiled);
        let gemini_schema = gemini_response_schema(&wire);
        assert!(gemini_schema.get("additionalProperties").is_none());
        assert!(gemini_schema["properties"]["sentiment"]["enum"].is_array());
    }

    #[test]
    fn extract_text_reads_first_candidate() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "positive"}]}}]
        });
        let value = extract_text(&payload).unwrap();
        assert_eq!(value.as_str(), Some("positive"));
    }

    #[test]
    fn extract_text_errors_on_unexpected_shape() {
        let payload = json!({"candidates": []});
        assert!(extract_text(&payload).is_err());
    }
}
