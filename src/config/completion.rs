use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::{optional_env, parse_bool_env};
use crate::error::ConfigError;
use crate::llm::ModelSelection;

/// Completion endpoint configuration.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// Bearer key, if the endpoint needs one.
    pub api_key: Option<SecretString>,
    /// Model to request. `None` means the caller must pick one per message.
    pub model: Option<String>,
    /// Provider tag forwarded with every request.
    pub provider: String,
    /// Whether the provider accepts knowledge-base fields.
    pub knowledge_aware: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            model: None,
            provider: "openai_compatible".to_string(),
            knowledge_aware: false,
        }
    }
}

impl CompletionConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: optional_env("COMPLETION_BASE_URL")?.unwrap_or(defaults.base_url),
            api_key: optional_env("COMPLETION_API_KEY")?.map(SecretString::from),
            model: optional_env("COMPLETION_MODEL")?,
            provider: optional_env("COMPLETION_PROVIDER")?.unwrap_or(defaults.provider),
            knowledge_aware: parse_bool_env("COMPLETION_KNOWLEDGE_AWARE", false)?,
        })
    }

    /// Get the API key if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    /// The model selection implied by this config.
    pub fn model_selection(&self) -> Result<ModelSelection, ConfigError> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "COMPLETION_MODEL".to_string(),
                hint: "set it to the model served by COMPLETION_BASE_URL".to_string(),
            })?;
        Ok(ModelSelection::new(model, self.provider.clone())
            .with_knowledge_bases(self.knowledge_aware))
    }
}
