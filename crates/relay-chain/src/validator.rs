use std::collections::HashSet;

use thiserror::Error;

use crate::chain::{Chain, ErrorPolicy, Step};
use crate::resolver::topological_sort;
use crate::template::extract_variable_refs;

/// A single structural or semantic defect in a chain definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("chain name is required")]
    MissingName,

    #[error("chain must have at least one step")]
    NoSteps,

    #[error("step {index}: id is required")]
    MissingStepId { index: usize },

    #[error("step {index}: duplicate id '{id}'")]
    DuplicateStepId { index: usize, id: String },

    #[error("step '{step}': tool_name is required")]
    MissingToolName { step: String },

    #[error("step '{step}': unknown tool '{tool}'")]
    UnknownTool { step: String, tool: String },

    #[error("step '{step}': depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{step}': invalid on_error value '{value}' (expected stop, skip or retry)")]
    InvalidOnError { step: String, value: String },

    #[error("step '{step}': references undefined variable '{variable}'")]
    UndefinedVariable { step: String, variable: String },

    #[error("dependency cycle detected")]
    DependencyCycle,
}

/// Check a chain definition, returning every issue found (empty = valid).
///
/// `tool_exists`, when supplied, is consulted for each non-empty tool name.
///
/// Dependency references are checked against step IDs declared *earlier* in
/// the list, so a step that depends on a later-declared step is reported as
/// an unknown dependency even though the chain would order it correctly.
pub fn validate_chain(
    chain: &Chain,
    tool_exists: Option<&dyn Fn(&str) -> bool>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if chain.name.is_empty() {
        issues.push(ValidationIssue::MissingName);
    }
    if chain.steps.is_empty() {
        issues.push(ValidationIssue::NoSteps);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (index, step) in chain.steps.iter().enumerate() {
        if step.id.is_empty() {
            issues.push(ValidationIssue::MissingStepId { index });
        } else if !seen.insert(step.id.as_str()) {
            issues.push(ValidationIssue::DuplicateStepId {
                index,
                id: step.id.clone(),
            });
        }
        let label = step_label(index, &step.id);

        if step.tool_name.is_empty() {
            issues.push(ValidationIssue::MissingToolName {
                step: label.clone(),
            });
        } else if let Some(exists) = tool_exists {
            if !exists(&step.tool_name) {
                issues.push(ValidationIssue::UnknownTool {
                    step: label.clone(),
                    tool: step.tool_name.clone(),
                });
            }
        }

        for dep in &step.depends_on {
            if !seen.contains(dep.as_str()) {
                issues.push(ValidationIssue::UnknownDependency {
                    step: label.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        if ErrorPolicy::parse(&step.on_error).is_none() {
            issues.push(ValidationIssue::InvalidOnError {
                step: label,
                value: step.on_error.clone(),
            });
        }
    }

    let declared: HashSet<&str> = chain.variables.iter().map(|v| v.name.as_str()).collect();
    for (index, step) in chain.steps.iter().enumerate() {
        for variable in extract_variable_refs(&step.params) {
            if !declared.contains(variable.as_str()) {
                issues.push(ValidationIssue::UndefinedVariable {
                    step: step_label(index, &step.id),
                    variable,
                });
            }
        }
    }

    // Dependencies on IDs no step carries are already reported above; leave
    // them out so only a genuine cycle fails the ordering.
    let ids: HashSet<&str> = chain.steps.iter().map(|s| s.id.as_str()).collect();
    let resolvable: Vec<Step> = chain
        .steps
        .iter()
        .map(|step| {
            let mut step = step.clone();
            step.depends_on.retain(|dep| ids.contains(dep.as_str()));
            step
        })
        .collect();
    if topological_sort(&resolvable).is_err() {
        issues.push(ValidationIssue::DependencyCycle);
    }

    issues
}

fn step_label(index: usize, id: &str) -> String {
    if id.is_empty() {
        format!("#{}", index)
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Variable;
    use serde_json::json;

    fn valid_chain() -> Chain {
        Chain::new("report")
            .with_variable(Variable::required("path"))
            .with_step(Step::new("read", "read").with_params(json!({"file_path": "{{path}}"})))
            .with_step(
                Step::new("save", "write")
                    .with_params(json!({"file_path": "out.txt", "content": "copy"}))
                    .depends_on(["read"])
                    .on_error("retry"),
            )
    }

    #[test]
    fn test_valid_chain_has_no_issues() {
        assert!(validate_chain(&valid_chain(), None).is_empty());
    }

    #[test]
    fn test_empty_chain() {
        let issues = validate_chain(&Chain::new(""), None);
        assert_eq!(
            issues,
            vec![ValidationIssue::MissingName, ValidationIssue::NoSteps]
        );
    }

    #[test]
    fn test_reports_all_issues_at_once() {
        let chain = Chain::new("broken")
            .with_step(Step::new("a", ""))
            .with_step(Step::new("a", "read").on_error("explode"))
            .with_step(Step::new("", "read").with_params(json!({"x": "{{missing}}"})));

        let issues = validate_chain(&chain, None);
        assert!(issues.contains(&ValidationIssue::MissingToolName { step: "a".into() }));
        assert!(issues.contains(&ValidationIssue::DuplicateStepId {
            index: 1,
            id: "a".into()
        }));
        assert!(issues.contains(&ValidationIssue::InvalidOnError {
            step: "a".into(),
            value: "explode".into()
        }));
        assert!(issues.contains(&ValidationIssue::MissingStepId { index: 2 }));
        assert!(issues.contains(&ValidationIssue::UndefinedVariable {
            step: "#2".into(),
            variable: "missing".into()
        }));
        assert_eq!(issues.len(), 5);
    }

    #[test]
    fn test_unknown_tool_with_checker() {
        let known = |name: &str| name == "read";
        let issues = validate_chain(&valid_chain(), Some(&known));
        assert_eq!(
            issues,
            vec![ValidationIssue::UnknownTool {
                step: "save".into(),
                tool: "write".into()
            }]
        );
    }

    #[test]
    fn test_forward_dependency_is_order_sensitive() {
        let chain = Chain::new("backwards")
            .with_step(Step::new("second", "write").depends_on(["first"]))
            .with_step(Step::new("first", "read"));

        let issues = validate_chain(&chain, None);
        assert_eq!(
            issues,
            vec![ValidationIssue::UnknownDependency {
                step: "second".into(),
                dependency: "first".into()
            }]
        );
    }

    #[test]
    fn test_cycle_reported_once() {
        let chain = Chain::new("loop")
            .with_step(Step::new("a", "read").depends_on(["a"]))
            .with_step(Step::new("b", "read").depends_on(["a", "b"]));

        // a step's own ID is registered before its dependencies are checked
        let issues = validate_chain(&chain, None);
        assert_eq!(issues, vec![ValidationIssue::DependencyCycle]);
    }

    #[test]
    fn test_missing_dependency_is_not_a_cycle() {
        let chain = Chain::new("orphan").with_step(Step::new("a", "read").depends_on(["ghost"]));

        let issues = validate_chain(&chain, None);
        assert_eq!(
            issues,
            vec![ValidationIssue::UnknownDependency {
                step: "a".into(),
                dependency: "ghost".into()
            }]
        );
    }

    #[test]
    fn test_cycle_still_found_next_to_missing_dependency() {
        let chain = Chain::new("tangled")
            .with_step(Step::new("a", "read").depends_on(["b", "ghost"]))
            .with_step(Step::new("b", "read").depends_on(["a"]));

        let issues = validate_chain(&chain, None);
        assert!(issues.contains(&ValidationIssue::UnknownDependency {
            step: "a".into(),
            dependency: "ghost".into()
        }));
        assert_eq!(issues.last(), Some(&ValidationIssue::DependencyCycle));
    }

    #[test]
    fn test_defaulted_variable_counts_as_declared() {
        let chain = Chain::new("greet")
            .with_variable(Variable::optional("who", "world"))
            .with_step(Step::new("say", "echo").with_params(json!({"text": "hi {{ who }}"})));
        assert!(validate_chain(&chain, None).is_empty());
    }

    #[test]
    fn test_issue_messages() {
        assert_eq!(
            ValidationIssue::InvalidOnError {
                step: "s1".into(),
                value: "never".into()
            }
            .to_string(),
            "step 's1': invalid on_error value 'never' (expected stop, skip or retry)"
        );
        assert_eq!(
            ValidationIssue::DependencyCycle.to_string(),
            "dependency cycle detected"
        );
    }
}
