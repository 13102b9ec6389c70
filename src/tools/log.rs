//! Tool execution log collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// Receives human-readable log lines keyed by tool-call id.
#[async_trait]
pub trait ToolLogSink: Send + Sync {
    async fn append(&self, tool_call_id: &str, line: String);
}

/// Keeps log lines in memory.
#[derive(Debug, Default)]
pub struct InMemoryToolLog {
    lines: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryToolLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines recorded for one call, oldest first.
    pub fn lines(&self, tool_call_id: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool_call_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolLogSink for InMemoryToolLog {
    async fn append(&self, tool_call_id: &str, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tool_call_id.to_string())
            .or_default()
            .push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_are_kept_per_call() {
        let log = InMemoryToolLog::new();
        log.append("a", "one".into()).await;
        log.append("b", "other".into()).await;
        log.append("a", "two".into()).await;
        assert_eq!(log.lines("a"), vec!["one", "two"]);
        assert!(log.lines("missing").is_empty());
    }
}
