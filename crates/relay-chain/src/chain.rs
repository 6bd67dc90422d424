use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Dynamically typed step parameters: a string-keyed JSON object.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A named, declarative multi-step workflow.
///
/// Persisted as `<sanitized-name>.json`; see [`crate::store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: vec![],
            variables: vec![],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Look up a declared variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// One tool invocation within a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Raw failure policy. Empty means "stop"; see [`Step::error_policy`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_error: String,
}

impl Step {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            params: Params::new(),
            depends_on: vec![],
            on_error: String::new(),
        }
    }

    /// Set the parameters. Anything other than a JSON object leaves them empty.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = match params {
            serde_json::Value::Object(map) => map,
            _ => Params::new(),
        };
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_error(mut self, policy: impl Into<String>) -> Self {
        self.on_error = policy.into();
        self
    }

    /// Parsed failure policy, or `None` if `on_error` holds an unrecognized value.
    pub fn error_policy(&self) -> Option<ErrorPolicy> {
        ErrorPolicy::parse(&self.on_error)
    }
}

/// What the runner does when a step fails or cannot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Stop,
    Skip,
    Retry,
}

impl ErrorPolicy {
    /// Parse a persisted `on_error` value. The empty string means `Stop`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "stop" => Some(Self::Stop),
            "skip" => Some(Self::Skip),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Skip => "skip",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared template variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Empty means "no default".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl Variable {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default: String::new(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default: default.into(),
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }
}

/// Outcome of one `ChainRunner::execute` call.
#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    pub chain_name: String,
    pub success: bool,
    pub step_results: Vec<StepResult>,
    #[serde(rename = "total_duration_ms", serialize_with = "as_millis")]
    pub total_duration: Duration,
    /// Failure summary; empty on success.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ChainResult {
    pub(crate) fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
            success: true,
            step_results: vec![],
            total_duration: Duration::ZERO,
            error: String::new(),
        }
    }

    /// Result for a step ID, if that step produced one.
    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == id)
    }

    /// Short human-readable report.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Chain '{}' {} in {}ms\n",
            self.chain_name,
            if self.success { "succeeded" } else { "failed" },
            self.total_duration.as_millis()
        );
        for r in &self.step_results {
            let status = if r.success {
                "ok"
            } else if r.skipped {
                "skipped"
            } else {
                "failed"
            };
            out.push_str(&format!(
                "  [{}] {} ({}) {}ms",
                status,
                r.step_id,
                r.tool_name,
                r.duration.as_millis()
            ));
            if !r.error.is_empty() {
                out.push_str(&format!(": {}", r.error));
            }
            out.push('\n');
        }
        if !self.error.is_empty() {
            out.push_str(&format!("Error: {}\n", self.error));
        }
        out
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub skipped: bool,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
