use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Tunables for the response orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many recent messages go into the Ask/Query transcript.
    pub history_window: usize,
    /// Top-K bound passed to knowledge-base-aware providers.
    pub top_k: u32,
    /// Preferred answer language for Query mode.
    pub preferred_language: Option<String>,
    /// Delay before lingering human-interaction state is cleared.
    pub interaction_cleanup_delay: Duration,
    /// Per-result truncation when formatting tool results for summaries.
    pub summary_max_result_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            top_k: 5,
            preferred_language: None,
            interaction_cleanup_delay: Duration::from_secs(30),
            summary_max_result_chars: 2000,
        }
    }
}

impl OrchestratorConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let history_window = parse_optional_env("CHAT_HISTORY_WINDOW", defaults.history_window)?;
        if history_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_HISTORY_WINDOW".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            history_window,
            top_k: parse_optional_env("QUERY_TOP_K", defaults.top_k)?,
            preferred_language: optional_env("QUERY_PREFERRED_LANGUAGE")?,
            interaction_cleanup_delay: Duration::from_secs(parse_optional_env(
                "HITL_CLEANUP_DELAY_SECS",
                defaults.interaction_cleanup_delay.as_secs(),
            )?),
            summary_max_result_chars: parse_optional_env(
                "SUMMARY_MAX_RESULT_CHARS",
                defaults.summary_max_result_chars,
            )?,
        })
    }
}
