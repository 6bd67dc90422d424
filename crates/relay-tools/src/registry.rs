use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use relay_core::error::{RelayError, Result};
use relay_core::traits::{Tool, ToolExecutor};
use relay_core::types::{ToolContext, ToolDefinition, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Registry of available tools. Doubles as the chain engine's execution backend.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    working_dir: PathBuf,
    default_timeout_secs: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            working_dir: PathBuf::from("."),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the directory relative tool paths resolve against.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the timeout for tools that don't declare their own.
    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name, bounded by its timeout and the context's cancellation token.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| RelayError::ToolNotFound(name.to_string()))?;

        let timeout_secs = tool.timeout_secs().unwrap_or(self.default_timeout_secs);
        let timeout = Duration::from_secs(timeout_secs);
        let cancel = ctx.cancel.clone();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            result = tokio::time::timeout(timeout, tool.execute(input, ctx)) => match result {
                Ok(result) => result,
                Err(_) => Err(RelayError::ToolTimeout {
                    tool: name.to_string(),
                    timeout_secs,
                }),
            },
        }
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::read::ReadTool);
        registry.register(crate::builtin::write::WriteTool);
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor for ToolRegistry {
    fn execute_tool<'a>(
        &'a self,
        name: &'a str,
        params: serde_json::Value,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let ctx = ToolContext {
                working_dir: self.working_dir.clone(),
                cancel,
            };
            let result = self.execute(name, params, ctx).await?;
            if result.is_error {
                debug!(tool = %name, "Tool reported an error result");
                return Err(RelayError::ToolExecution {
                    tool: name.to_string(),
                    message: result.content,
                });
            }
            Ok(result.content)
        })
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps longer than its timeout"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolResult::success("late"))
            })
        }
        fn timeout_secs(&self) -> Option<u64> {
            Some(1)
        }
    }

    struct FlagTool;

    impl Tool for FlagTool {
        fn name(&self) -> &str {
            "flag"
        }
        fn description(&self) -> &str {
            "Returns an error-flagged result"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async { Ok(ToolResult::error("quota exceeded")) })
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.list(), vec!["read", "write"]);
        assert!(registry.has_tool("read"));
        assert!(!registry.has_tool("web_search"));
    }

    #[test]
    fn unregister_removes_tool() {
        let mut registry = ToolRegistry::with_builtins();
        assert!(registry.unregister("write"));
        assert!(!registry.unregister("write"));
        assert!(!registry.has_tool("write"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute_tool("nope", serde_json::json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry
            .execute_tool("slow", serde_json::json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ToolTimeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_invocation() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = registry
            .execute_tool("slow", serde_json::json!({}), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Cancelled));
    }

    #[tokio::test]
    async fn error_result_becomes_execution_error() {
        let mut registry = ToolRegistry::new();
        registry.register(FlagTool);
        let err = registry
            .execute_tool("flag", serde_json::json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool execution failed: flag: quota exceeded");
    }
}
