//! Provider Adapter: a single interface over N LLM backends.
//!
//! Each backend translates a list of role-tagged messages plus an optional
//! compiled [`WireSchema`] into either a structured call (provider-native)
//! or a text-generation call. Token accounting, truncation, and mojibake
//! repair are shared across backends; only the wire request/response shape
//! differs per provider.

pub mod gemini;
pub mod mojibake;
pub mod openai;
pub mod tokens;

pub use tokens::{ModelInfo, count_tokens, model_info, truncate_to_fit};

use crate::error::ProviderError;
use crate::schema::WireSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// A message role in the provider-neutral conversation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// System/instructions message.
    System,
    /// End-user message (the rendered prompt).
    User,
    /// A prior assistant turn (unused by the engine today, but part of the
    /// uniform interface so backends that support multi-turn history have
    /// somewhere to put it).
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone)]
pub struct Message {
    /// The message's role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Constructs a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Constructs a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Collapses a role-tagged message list into a single string for backends
/// that have no native multi-message API, prefixing each line with
/// `"Instructions: "` / `"User: "` / `"Assistant: "`.
#[must_use]
pub fn collapse_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let prefix = match m.role {
                Role::System => "Instructions: ",
                Role::User => "User: ",
                Role::Assistant => "Assistant: ",
            };
            format!("{prefix}{}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sampling/length parameters for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the completion.
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Uniform interface over an LLM backend.
///
/// A `Provider` is constructed once per run and passed explicitly through
/// the pipeline.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The provider's identifying name, used in error messages and logs.
    fn name(&self) -> &str;

    /// Generates free text from a message list.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport or API failure.
    async fn generate_text(&self, model: &str, messages: &[Message], params: GenerationParams) -> Result<String, ProviderError>;

    /// Generates a structured response matching `schema`, returning the
    /// parsed JSON value. Providers that accept a schema natively submit it
    /// directly; others request JSON and parse the returned text
    /// (validation against the compiled schema happens downstream in the
    /// engine).
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport, API, or JSON-parse failure.
    async fn generate_structured(
        &self,
        model: &str,
        messages: &[Message],
        schema: &WireSchema,
        params: GenerationParams,
    ) -> Result<Value, ProviderError>;

    /// Approximate or exact token count for `text`.
    fn count_tokens(&self, text: &str) -> u32 {
        tokens::count_tokens(text)
    }

    /// Maximum context window for `model`, when known.
    fn max_context_tokens(&self, model: &str) -> Option<u32> {
        tokens::model_info(model).map(|info| info.context_limit)
    }
}

/// Resolves the registered `Provider` for a model name by backend prefix
/// convention (`gpt-*`/`o1-*`/`o3-*` → OpenAI, `gemini-*` → Gemini), the way
/// `original_source/src/llm_operations.py::get_provider_for_model` dispatches
/// on model name rather than requiring an explicit `provider:` config key.
#[must_use]
pub fn backend_for_model(model: &str) -> Backend {
    if model.starts_with("gemini") {
        Backend::Gemini
    } else {
        Backend::OpenAi
    }
}

/// Which concrete adapter a model name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Routes through [`openai::OpenAiProvider`].
    OpenAi,
    /// Routes through [`gemini::GeminiProvider`].
    Gemini,
}

/// Constructs each backend's client at most once per run and hands out
/// shared references by model name.
#[derive(Default)]
pub struct ProviderRegistry {
    openai: OnceLock<Arc<dyn Provider>>,
    gemini: OnceLock<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry; backends are constructed lazily on first
    /// use by [`Self::resolve`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `model` to its backend's client, constructing it from
    /// environment credentials on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCredentials`] if the backend's API
    /// key is not set in the environment.
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        match backend_for_model(model) {
            Backend::OpenAi => Self::get_or_try_init(&self.openai, || {
                openai::OpenAiProvider::from_env().map(|p| Arc::new(p) as Arc<dyn Provider>)
            }),
            Backend::Gemini => Self::get_or_try_init(&self.gemini, || {
                gemini::GeminiProvider::from_env().map(|p| Arc::new(p) as Arc<dyn Provider>)
            }),
        }
    }

    fn get_or_try_init(cell: &OnceLock<Arc<dyn Provider>>, build: impl FnOnce() -> Result<Arc<dyn Provider>, ProviderError>) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(existing) = cell.get() {
            return Ok(existing.clone());
        }
        let provider = build()?;
        Ok(cell.get_or_init(|| provider).clone())
    }

    /// Pre-populates a backend slot with an already-constructed provider,
    /// bypassing environment-credential lookup. Lets integration tests
    /// substitute a scripted double for [`Self::resolve`] without touching
    /// the process environment.
    pub fn register_for_test(&self, backend: Backend, provider: Arc<dyn Provider>) {
        let cell = match backend {
            Backend::OpenAi => &self.openai,
            Backend::Gemini => &self.gemini,
        };
        let _ = cell.set(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_messages_with_role_prefixes() {
        let messages = vec![Message::system("be terse"), Message::user("classify this")];
        let collapsed = collapse_messages(&messages);
        assert!(collapsed.contains("Instructions: be terse"));
        assert!(collapsed.contains("User: classify this"));
    }

    #[test]
    fn backend_dispatch_by_model_prefix() {
        assert_eq!(backend_for_model("gpt-4o-mini"), Backend::OpenAi);
        assert_eq!(backend_for_model("gemini-2.0-flash"), Backend::Gemini);
    }
}
