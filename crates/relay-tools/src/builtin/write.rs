use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use relay_core::error::{RelayError, Result};
use relay_core::traits::Tool;
use relay_core::types::{ToolContext, ToolResult};

use super::resolve_path;

pub struct WriteTool;

#[derive(Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories. Overwrites unless append is set."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path, or path relative to the tools working directory"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default: false)"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: WriteInput = serde_json::from_value(input)
                .map_err(|e| RelayError::ToolValidation(e.to_string()))?;

            let path = resolve_path(&params.file_path, &ctx.working_dir);
            debug!(path = %path.display(), append = params.append, "Writing file");

            let fail = |e: std::io::Error| RelayError::ToolExecution {
                tool: "write".to_string(),
                message: format!("{}: {}", path.display(), e),
            };

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(fail)?;
            }

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(params.append)
                .truncate(!params.append)
                .open(&path)
                .await
                .map_err(fail)?;
            file.write_all(params.content.as_bytes())
                .await
                .map_err(fail)?;
            file.flush().await.map_err(fail)?;

            Ok(ToolResult::success(format!(
                "Wrote {} bytes to {}",
                params.content.len(),
                path.display()
            )))
        })
    }
}
