//! Configuration resolved from the environment (and `.env`, via dotenvy).

mod completion;
pub(crate) mod helpers;
mod orchestrator;

pub use completion::CompletionConfig;
pub use orchestrator::OrchestratorConfig;

use crate::error::ConfigError;

/// Full process configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub completion: CompletionConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Resolve configuration from environment variables.
    ///
    /// Callers that want `.env` support should run `dotenvy::dotenv()` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            completion: CompletionConfig::resolve()?,
            orchestrator: OrchestratorConfig::resolve()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Serializes env-mutating tests to prevent parallel races.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "COMPLETION_BASE_URL",
        "COMPLETION_API_KEY",
        "COMPLETION_MODEL",
        "COMPLETION_PROVIDER",
        "COMPLETION_KNOWLEDGE_AWARE",
        "CHAT_HISTORY_WINDOW",
        "QUERY_TOP_K",
        "QUERY_PREFERRED_LANGUAGE",
        "HITL_CLEANUP_DELAY_SECS",
        "SUMMARY_MAX_RESULT_CHARS",
    ];

    fn clear_env() {
        // SAFETY: Only called under ENV_MUTEX in tests.
        unsafe {
            for key in KEYS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = Config::from_env().expect("config");
        assert_eq!(config.orchestrator.history_window, 10);
        assert_eq!(config.orchestrator.top_k, 5);
        assert_eq!(
            config.orchestrator.interaction_cleanup_delay,
            Duration::from_secs(30)
        );
        assert!(config.completion.model.is_none());
        assert!(!config.completion.knowledge_aware);
        assert!(matches!(
            config.completion.model_selection(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn env_overrides_are_applied() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("COMPLETION_MODEL", "llama3");
            std::env::set_var("COMPLETION_KNOWLEDGE_AWARE", "true");
            std::env::set_var("CHAT_HISTORY_WINDOW", "4");
            std::env::set_var("HITL_CLEANUP_DELAY_SECS", "5");
            std::env::set_var("QUERY_PREFERRED_LANGUAGE", "de");
        }

        let config = Config::from_env().expect("config");
        let selection = config.completion.model_selection().expect("selection");
        assert_eq!(selection.model, "llama3");
        assert!(selection.knowledge_bases);
        assert_eq!(config.orchestrator.history_window, 4);
        assert_eq!(
            config.orchestrator.interaction_cleanup_delay,
            Duration::from_secs(5)
        );
        assert_eq!(
            config.orchestrator.preferred_language.as_deref(),
            Some("de")
        );
        clear_env();
    }

    #[test]
    fn invalid_values_are_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("QUERY_TOP_K", "many");
        }
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("QUERY_TOP_K"));

        clear_env();
        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("CHAT_HISTORY_WINDOW", "0");
        }
        assert!(Config::from_env().is_err());

        clear_env();
        // SAFETY: Under ENV_MUTEX.
        unsafe {
            std::env::set_var("COMPLETION_KNOWLEDGE_AWARE", "maybe");
        }
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
