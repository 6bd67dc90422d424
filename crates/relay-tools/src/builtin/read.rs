use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use relay_core::error::{RelayError, Result};
use relay_core::traits::Tool;
use relay_core::types::{ToolContext, ToolResult};

use super::resolve_path;

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadTool;

#[derive(Deserialize)]
struct ReadInput {
    file_path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a text file with 1-indexed line numbers. Supports line offset and limit."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path, or path relative to the tools working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default: 2000)"
                }
            },
            "required": ["file_path"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: ReadInput = serde_json::from_value(input)
                .map_err(|e| RelayError::ToolValidation(e.to_string()))?;

            let path = resolve_path(&params.file_path, &ctx.working_dir);
            debug!(path = %path.display(), "Reading file");

            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                RelayError::ToolExecution {
                    tool: "read".to_string(),
                    message: format!("{}: {}", path.display(), e),
                }
            })?;

            Ok(ToolResult::success(number_lines(
                &content,
                params.offset.unwrap_or(1),
                params.limit.unwrap_or(DEFAULT_LIMIT),
            )))
        })
    }
}

fn number_lines(content: &str, offset: usize, limit: usize) -> String {
    let skip = offset.max(1) - 1;
    let mut output = String::new();
    for (i, line) in content.lines().enumerate().skip(skip).take(limit) {
        let display: String = line.chars().take(MAX_LINE_CHARS).collect();
        output.push_str(&format!("{:>6}\t{}\n", i + 1, display));
    }
    if output.is_empty() {
        output = "(empty file)".to_string();
    }
    output
}
