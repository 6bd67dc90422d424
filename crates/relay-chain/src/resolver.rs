use std::collections::{HashMap, VecDeque};

use relay_core::error::{RelayError, Result};

use crate::chain::Step;

/// Order steps so every step follows all of its dependencies (Kahn's algorithm).
///
/// Ties are broken by declaration order. A dependency on an ID that no step
/// carries can never be satisfied and is reported the same way as a cycle.
pub fn topological_sort(steps: &[Step]) -> Result<Vec<&Step>> {
    let mut in_degree: Vec<usize> = steps.iter().map(|s| s.depends_on.len()).collect();

    // dependency id -> indices of steps that wait on it
    let mut dependents: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            dependents.entry(dep.as_str()).or_default().push(idx);
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(idx) = queue.pop_front() {
        let step = &steps[idx];
        ordered.push(step);
        if let Some(waiting) = dependents.get(step.id.as_str()) {
            for &next in waiting {
                // duplicate step IDs can release the same dependent twice
                if in_degree[next] == 0 {
                    continue;
                }
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if ordered.len() < steps.len() {
        return Err(RelayError::CycleDetected);
    }
    Ok(ordered)
}
