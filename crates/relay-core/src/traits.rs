use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::*;

/// A single named capability a chain step can invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (referenced by `tool_name` in chain steps).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool. `None` defers to the registry default.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

/// Tool-execution backend consumed by the chain engine.
///
/// Implementations must be safe to call from several chain runs at once.
/// They report failures as errors and never panic across this boundary.
pub trait ToolExecutor: Send + Sync + 'static {
    /// Run the named tool with fully resolved parameters, returning its textual output.
    fn execute_tool<'a>(
        &'a self,
        name: &'a str,
        params: serde_json::Value,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<String>>;

    /// Whether a tool with this name is currently registered.
    fn has_tool(&self, name: &str) -> bool;
}
