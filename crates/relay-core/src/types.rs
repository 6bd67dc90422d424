use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition as shown by `relay tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Chain execution event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// Setup succeeded and the first step is about to be considered.
    ChainStarted { chain: String, total_steps: usize },
    /// A ready step is about to invoke its tool.
    StepStarted {
        chain: String,
        step_id: String,
        tool_name: String,
    },
    /// The first attempt failed and the step is being retried.
    StepRetrying {
        chain: String,
        step_id: String,
        error: String,
    },
    /// A step produced its result (success, failure or skip).
    StepFinished {
        chain: String,
        step_id: String,
        success: bool,
        skipped: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    /// Every attempted step ran to completion without a stop.
    ChainComplete {
        chain: String,
        steps_run: usize,
        total_duration_ms: u64,
    },
    /// The chain stopped on a failing step.
    ChainFailed {
        chain: String,
        error: String,
        total_duration_ms: u64,
    },
}

impl ChainEvent {
    /// Name of the chain this event belongs to.
    pub fn chain(&self) -> &str {
        match self {
            Self::ChainStarted { chain, .. }
            | Self::StepStarted { chain, .. }
            | Self::StepRetrying { chain, .. }
            | Self::StepFinished { chain, .. }
            | Self::ChainComplete { chain, .. }
            | Self::ChainFailed { chain, .. } => chain,
        }
    }

    /// Whether this event ends a chain run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChainComplete { .. } | Self::ChainFailed { .. })
    }
}
