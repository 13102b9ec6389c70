//! Tool execution against the server pool.

use std::time::{Duration, Instant};

use crate::error::{ToolCallError, ToolError};
use crate::tools::log::ToolLogSink;
use crate::tools::registry::ToolServerPool;
use crate::tools::state::ToolCall;

/// Outcome of one tool invocation.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Interpreted payload, or a diagnostic.
    pub outcome: Result<serde_json::Value, String>,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Record the outcome on an executing call.
    pub fn apply_to(&self, call: &mut ToolCall) -> Result<(), ToolCallError> {
        let secs = self.elapsed.as_secs_f64();
        match &self.outcome {
            Ok(payload) => call.complete(payload.clone(), secs),
            Err(diagnostic) => call.fail(diagnostic.clone(), secs),
        }
    }
}

/// Arguments arrive either structured or as a JSON string.
pub fn parse_arguments(
    name: &str,
    arguments: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    match arguments {
        serde_json::Value::String(raw) if raw.trim().is_empty() => {
            Ok(serde_json::Value::Object(Default::default()))
        }
        serde_json::Value::String(raw) => {
            serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
                name: name.to_string(),
                reason: e.to_string(),
            })
        }
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        other => Ok(other.clone()),
    }
}

/// Invoke the tool behind `call` and interpret its result.
///
/// Never fails: server lookup, argument and invocation errors all become a
/// diagnostic in the report. Start and finish lines go to `log` regardless
/// of outcome.
pub async fn execute_tool_call(
    pool: &ToolServerPool,
    log: &dyn ToolLogSink,
    call: &ToolCall,
) -> ExecutionReport {
    log.append(
        &call.id,
        format!(
            "Starting {} on server {}",
            call.function_name, call.server_id
        ),
    )
    .await;
    tracing::debug!(
        tool_call_id = %call.id,
        tool = %call.function_name,
        server_id = %call.server_id,
        "Tool call started"
    );

    let start = Instant::now();
    let outcome = invoke(pool, call).await;
    let elapsed = start.elapsed();

    match &outcome {
        Ok(payload) => {
            tracing::debug!(
                tool_call_id = %call.id,
                tool = %call.function_name,
                elapsed_ms = elapsed.as_millis() as u64,
                result = %payload,
                "Tool call succeeded"
            );
            log.append(
                &call.id,
                format!(
                    "Completed {} in {:.2}s",
                    call.function_name,
                    elapsed.as_secs_f64()
                ),
            )
            .await;
        }
        Err(diagnostic) => {
            tracing::debug!(
                tool_call_id = %call.id,
                tool = %call.function_name,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %diagnostic,
                "Tool call failed"
            );
            log.append(
                &call.id,
                format!(
                    "Failed {} after {:.2}s: {}",
                    call.function_name,
                    elapsed.as_secs_f64(),
                    diagnostic
                ),
            )
            .await;
        }
    }

    ExecutionReport { outcome, elapsed }
}

async fn invoke(pool: &ToolServerPool, call: &ToolCall) -> Result<serde_json::Value, String> {
    let server = pool
        .get(&call.server_id)
        .ok_or_else(|| {
            ToolError::ServerNotFound {
                server_id: call.server_id.clone(),
            }
            .to_string()
        })?;

    let arguments =
        parse_arguments(&call.function_name, &call.arguments).map_err(|e| e.to_string())?;

    let raw = server
        .call_tool(&call.function_name, arguments)
        .await
        .map_err(|e| e.to_string())?;

    server.interpret_result(raw)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::StubToolServer;
    use crate::tools::log::InMemoryToolLog;
    use crate::tools::state::ToolCallStatus;

    fn pool(server: StubToolServer) -> ToolServerPool {
        ToolServerPool::new().with_server(Arc::new(server))
    }

    #[test]
    fn test_parse_arguments_from_string() {
        let parsed = parse_arguments("t", &serde_json::json!("{\"a\": 1}")).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": 1}));
        assert_eq!(
            parse_arguments("t", &serde_json::json!("")).unwrap(),
            serde_json::json!({})
        );
        assert!(matches!(
            parse_arguments("t", &serde_json::json!("{oops")),
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_success_is_interpreted_and_logged() {
        let server = StubToolServer::new("s")
            .with_response("lookup", serde_json::json!({"success": true, "data": [1, 2]}));
        let pool = pool(server);
        let log = InMemoryToolLog::new();
        let call = ToolCall::new("c1", "lookup", serde_json::json!("{\"q\":\"x\"}"), "s");

        let report = execute_tool_call(&pool, &log, &call).await;
        assert_eq!(report.outcome.unwrap(), serde_json::json!([1, 2]));

        let lines = log.lines("c1");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Starting lookup"));
        assert!(lines[1].starts_with("Completed lookup"));
    }

    #[tokio::test]
    async fn test_missing_server_becomes_error_outcome() {
        let pool = ToolServerPool::new();
        let log = InMemoryToolLog::new();
        let call = ToolCall::new("c1", "lookup", serde_json::json!({}), "gone");

        let report = execute_tool_call(&pool, &log, &call).await;
        assert!(report.outcome.unwrap_err().contains("gone"));
        assert!(log.lines("c1")[1].starts_with("Failed lookup"));
    }

    #[tokio::test]
    async fn test_report_applies_to_executing_call() {
        let server = StubToolServer::new("s").with_failure("boom", "kaput");
        let pool = pool(server);
        let log = InMemoryToolLog::new();
        let mut call = ToolCall::new("c1", "boom", serde_json::json!({}), "s");
        call.transition_to(ToolCallStatus::Approved).unwrap();
        call.transition_to(ToolCallStatus::Executing).unwrap();

        let report = execute_tool_call(&pool, &log, &call).await;
        report.apply_to(&mut call).unwrap();
        assert_eq!(call.status, ToolCallStatus::Error);
        assert!(call.result.unwrap().as_str().unwrap().contains("kaput"));
        assert!(call.duration_secs.is_some());
    }
}
