//! Test doubles for the chain engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use relay_core::error::{RelayError, Result};
use relay_core::traits::ToolExecutor;

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub params: serde_json::Value,
}

/// A `ToolExecutor` that replays queued outcomes per tool and records every call.
///
/// Tools with an empty queue succeed with `"<tool> ok"`.
#[derive(Default)]
pub struct ScriptedExecutor {
    known: HashSet<String>,
    outcomes: Mutex<HashMap<String, VecDeque<std::result::Result<String, String>>>>,
    calls: Mutex<Vec<ToolCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark tools as registered without scripting them.
    pub fn with_tools(mut self, names: &[&str]) -> Self {
        self.known.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Queue a successful outcome for the next call to `tool`.
    pub fn succeed(self, tool: &str, output: &str) -> Self {
        self.push(tool, Ok(output.to_string()))
    }

    /// Queue a failure for the next call to `tool`.
    pub fn fail(self, tool: &str, message: &str) -> Self {
        self.push(tool, Err(message.to_string()))
    }

    fn push(mut self, tool: &str, outcome: std::result::Result<String, String>) -> Self {
        self.known.insert(tool.to_string());
        self.outcomes
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tool.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Tool names of every invocation so far, in order.
    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.tool).collect()
    }

    /// How many times `tool` was invoked.
    pub fn call_count(&self, tool: &str) -> usize {
        self.calls().iter().filter(|c| c.tool == tool).count()
    }
}

impl ToolExecutor for ScriptedExecutor {
    fn execute_tool<'a>(
        &'a self,
        name: &'a str,
        params: serde_json::Value,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(ToolCall {
                    tool: name.to_string(),
                    params,
                });
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }
            let next = self
                .outcomes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(name)
                .and_then(|queue| queue.pop_front());
            match next {
                Some(Ok(output)) => Ok(output),
                Some(Err(message)) => Err(RelayError::ToolExecution {
                    tool: name.to_string(),
                    message,
                }),
                None => Ok(format!("{} ok", name)),
            }
        })
    }

    fn has_tool(&self, name: &str) -> bool {
        self.known.contains(name)
    }
}
