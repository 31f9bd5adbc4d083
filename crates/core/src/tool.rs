//! Tool trait and executor — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. The agent
//! loop only depends on [`ToolExecutor`]; [`ToolRegistry`] is the stock
//! executor that dispatches to registered [`Tool`]s by name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request from the model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments as a JSON value
    pub args: serde_json::Value,

    /// Unique call ID (matches the model's tool call id)
    pub call_id: String,
}

/// The result of a tool execution.
///
/// A result with `success == false` is ordinary tool output, not a loop error:
/// it is handed back to the model on the next round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            content: Some(content.into()),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            content: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// The text fed back to the model as the tool message.
    pub fn as_model_output(&self) -> String {
        if self.success {
            self.content.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("tool failed"))
        }
    }
}

/// A single agent capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "current_time").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. `call_id` and `duration_ms` are filled in by the executor.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Executes tool calls on behalf of the agent loop.
///
/// `execute` either returns a [`ToolResult`] (possibly a failed one) or throws
/// a classified [`ToolError`]. It must respect `timeout`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions for every tool this executor can run.
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, request: &ToolCallRequest, timeout: Duration) -> Result<ToolResult, ToolError>;
}

/// A registry of available tools, ordered by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn execute(&self, request: &ToolCallRequest, timeout: Duration) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&request.tool_name)
            .ok_or_else(|| ToolError::NotFound(request.tool_name.clone()))?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, tool.execute(request.args.clone()))
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: request.tool_name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            })?;

        let mut result = outcome?;
        result.call_id = request.call_id.clone();
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            tool = %request.tool_name,
            call_id = %request.call_id,
            success = result.success,
            duration_ms = result.duration_ms,
            "Tool executed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            match arguments["text"].as_str() {
                Some(text) => Ok(ToolResult::ok(text)),
                None => Ok(ToolResult::failed("missing 'text'")),
            }
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Never finishes in time" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::ok("late"))
        }
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            tool_name: name.into(),
            args,
            call_id: "call_1".into(),
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "slow");
    }

    #[tokio::test]
    async fn registry_execute_tool_fills_call_id() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&call("echo", serde_json::json!({"text": "hello world"})), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.content.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn failed_result_is_not_an_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&call("echo", serde_json::json!({})), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.as_model_output(), "Error: missing 'text'");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&call("nonexistent", serde_json::json!({})), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn registry_enforces_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        let err = registry
            .execute(&call("slow", serde_json::json!({})), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 50, .. }));
        assert!(err.is_retryable());
    }
}
