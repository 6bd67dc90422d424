use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::error::{RelayError, Result};
use relay_core::event::EventBus;
use relay_core::traits::ToolExecutor;
use relay_core::types::ChainEvent;

use crate::chain::{Chain, ChainResult, ErrorPolicy, Step, StepResult};
use crate::resolver::topological_sort;
use crate::template::substitute_vars;

const DEPENDENCY_NOT_MET: &str = "dependency not met";

/// Executes chains step by step against a tool backend.
///
/// Steps run sequentially in dependency order. A step runs only once every
/// step it depends on has *succeeded*; skipped steps never satisfy a
/// dependency. The runner keeps no state between calls, so one instance can
/// serve concurrent executions as long as the backend allows it.
pub struct ChainRunner {
    executor: Option<Arc<dyn ToolExecutor>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ChainRunner {
    pub fn new(executor: Option<Arc<dyn ToolExecutor>>) -> Self {
        Self {
            executor,
            event_bus: None,
        }
    }

    /// Publish [`ChainEvent`]s for every run to this bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Execute a chain with caller-provided variable values.
    ///
    /// Returns `Err` only for setup failures that prevent any step from
    /// running: no executor, a missing required variable, or a dependency
    /// cycle. Step failures are reported inside the returned [`ChainResult`].
    pub async fn execute(
        &self,
        chain: &Chain,
        variables: &HashMap<String, String>,
    ) -> Result<ChainResult> {
        self.execute_with_cancel(chain, variables, CancellationToken::new())
            .await
    }

    /// Like [`ChainRunner::execute`], forwarding `cancel` to every tool invocation.
    pub async fn execute_with_cancel(
        &self,
        chain: &Chain,
        variables: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<ChainResult> {
        let start = Instant::now();

        let executor = self.executor.as_ref().ok_or(RelayError::NoExecutor)?;
        let values = resolve_variables(chain, variables)?;
        let ordered = topological_sort(&chain.steps)?;

        info!(chain = %chain.name, steps = ordered.len(), "Executing chain");
        self.publish(ChainEvent::ChainStarted {
            chain: chain.name.clone(),
            total_steps: ordered.len(),
        });

        let mut result = ChainResult::new(&chain.name);
        let mut completed: HashSet<&str> = HashSet::new();

        for step in ordered {
            let policy = policy_for(step);

            let unmet: Vec<&str> = step
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|dep| !completed.contains(dep))
                .collect();

            if !unmet.is_empty() {
                let step_start = Instant::now();
                let step_result = StepResult {
                    step_id: step.id.clone(),
                    tool_name: step.tool_name.clone(),
                    error: DEPENDENCY_NOT_MET.to_string(),
                    skipped: true,
                    duration: step_start.elapsed(),
                    ..Default::default()
                };
                debug!(step_id = %step.id, unmet = ?unmet, policy = %policy, "Step not ready");
                self.publish_step(&chain.name, &step_result);
                result.step_results.push(step_result);

                // retry has nothing to re-invoke here and behaves like skip
                if policy == ErrorPolicy::Stop {
                    result.success = false;
                    result.error = format!(
                        "step {} skipped: {} ({})",
                        step.id,
                        DEPENDENCY_NOT_MET,
                        unmet.join(", ")
                    );
                    break;
                }
                continue;
            }

            let step_start = Instant::now();
            let params = serde_json::Value::Object(substitute_vars(&step.params, &values));
            self.publish(ChainEvent::StepStarted {
                chain: chain.name.clone(),
                step_id: step.id.clone(),
                tool_name: step.tool_name.clone(),
            });
            debug!(step_id = %step.id, tool = %step.tool_name, "Running step");

            let mut step_result = StepResult {
                step_id: step.id.clone(),
                tool_name: step.tool_name.clone(),
                ..Default::default()
            };

            let outcome = executor
                .execute_tool(&step.tool_name, params.clone(), cancel.clone())
                .await;

            let mut stop_error = None;
            match outcome {
                Ok(output) => {
                    step_result.success = true;
                    step_result.output = output;
                }
                Err(e) => match policy {
                    ErrorPolicy::Stop => {
                        step_result.error = e.to_string();
                        stop_error = Some(format!("step {} failed: {}", step.id, e));
                    }
                    ErrorPolicy::Skip => {
                        warn!(step_id = %step.id, error = %e, "Step failed, skipping");
                        step_result.error = e.to_string();
                        step_result.skipped = true;
                    }
                    ErrorPolicy::Retry => {
                        warn!(step_id = %step.id, error = %e, "Step failed, retrying once");
                        self.publish(ChainEvent::StepRetrying {
                            chain: chain.name.clone(),
                            step_id: step.id.clone(),
                            error: e.to_string(),
                        });
                        match executor
                            .execute_tool(&step.tool_name, params, cancel.clone())
                            .await
                        {
                            Ok(output) => {
                                step_result.success = true;
                                step_result.output = output;
                            }
                            Err(e) => {
                                step_result.error = e.to_string();
                                stop_error =
                                    Some(format!("step {} failed after retry: {}", step.id, e));
                            }
                        }
                    }
                },
            }

            step_result.duration = step_start.elapsed();
            if step_result.success {
                completed.insert(step.id.as_str());
            }
            self.publish_step(&chain.name, &step_result);
            result.step_results.push(step_result);

            if let Some(error) = stop_error {
                result.success = false;
                result.error = error;
                break;
            }
        }

        result.total_duration = start.elapsed();
        let total_duration_ms = result.total_duration.as_millis() as u64;
        if result.success {
            info!(chain = %chain.name, elapsed_ms = total_duration_ms, "Chain complete");
            self.publish(ChainEvent::ChainComplete {
                chain: chain.name.clone(),
                steps_run: result.step_results.len(),
                total_duration_ms,
            });
        } else {
            warn!(chain = %chain.name, error = %result.error, "Chain failed");
            self.publish(ChainEvent::ChainFailed {
                chain: chain.name.clone(),
                error: result.error.clone(),
                total_duration_ms,
            });
        }

        Ok(result)
    }

    fn publish(&self, event: ChainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn publish_step(&self, chain: &str, r: &StepResult) {
        self.publish(ChainEvent::StepFinished {
            chain: chain.to_string(),
            step_id: r.step_id.clone(),
            success: r.success,
            skipped: r.skipped,
            duration_ms: r.duration.as_millis() as u64,
            error: (!r.error.is_empty()).then(|| r.error.clone()),
        });
    }
}

/// Effective variable map: declared non-empty defaults overlaid with provided values.
///
/// Fails if a required variable is neither provided nor defaulted.
pub fn resolve_variables(
    chain: &Chain,
    provided: &HashMap<String, String>,
) -> Result<HashMap<String, String>> {
    for var in chain.variables.iter().filter(|v| v.required) {
        if !provided.contains_key(&var.name) && var.default.is_empty() {
            return Err(RelayError::MissingVariable(var.name.clone()));
        }
    }

    let mut values: HashMap<String, String> = chain
        .variables
        .iter()
        .filter(|v| !v.default.is_empty())
        .map(|v| (v.name.clone(), v.default.clone()))
        .collect();
    values.extend(provided.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(values)
}

fn policy_for(step: &Step) -> ErrorPolicy {
    step.error_policy().unwrap_or_else(|| {
        warn!(step_id = %step.id, on_error = %step.on_error, "Unrecognized on_error, using stop");
        ErrorPolicy::Stop
    })
}
