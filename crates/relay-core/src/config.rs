use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RelayError};

/// Top-level Relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace")]
    pub dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace(),
        }
    }
}

/// Where chain definitions live and how they are run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Directory of `<name>.json` chain files. Relative paths resolve under the workspace.
    #[serde(default = "default_chains_dir")]
    pub dir: String,
    /// Run the validator against the tool registry before every execution.
    #[serde(default = "default_validate_before_run")]
    pub validate_before_run: bool,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            dir: default_chains_dir(),
            validate_before_run: default_validate_before_run(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default per-invocation timeout for tools that don't set their own.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    /// Base directory for relative file paths handed to built-in tools.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            working_dir: default_working_dir(),
        }
    }
}

/// JSONL chain run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory for log files. Relative paths resolve under the workspace.
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Logging level: 1 = chain summary only, 2 = per-step, 3 = verbose (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

fn default_workspace() -> String { "~/.relay".to_string() }
fn default_chains_dir() -> String { "chains".to_string() }
fn default_validate_before_run() -> bool { true }
fn default_tool_timeout() -> u64 { 30 }
fn default_working_dir() -> String { ".".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| RelayError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.workspace.dir)
    }

    /// Resolve the chains directory against the workspace.
    pub fn chains_dir(&self) -> PathBuf {
        self.under_workspace(&self.chains.dir)
    }

    /// Resolve the log directory against the workspace.
    pub fn log_dir(&self) -> PathBuf {
        self.under_workspace(&self.log.dir)
    }

    fn under_workspace(&self, dir: &str) -> PathBuf {
        let path = expand_home(dir);
        if path.is_absolute() {
            path
        } else {
            self.workspace_dir().join(path)
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

pub fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
