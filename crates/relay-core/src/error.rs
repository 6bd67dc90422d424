use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    #[error("Cancelled")]
    Cancelled,

    // Chain errors
    #[error("No tool executor configured")]
    NoExecutor,

    #[error("Dependency cycle detected")]
    CycleDetected,

    #[error("Missing required variable: {0}")]
    MissingVariable(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
