use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_chain::{
    delete_chain, find_chain, list_chains, load_chain, save_chain, validate_chain, Chain,
    ChainResult, ChainRunLogger, ChainRunner,
};
use relay_core::config::AppConfig;
use relay_core::event::EventBus;
use relay_core::traits::ToolExecutor;
use relay_tools::ToolRegistry;

use crate::{build_registry, ChainAction};

/// Dispatch a `relay chain` subcommand. Returns `false` when the process
/// should exit non-zero (invalid chain or failed run).
pub(crate) async fn handle(config: &AppConfig, action: ChainAction) -> anyhow::Result<bool> {
    let chains_dir = config.chains_dir();

    match action {
        ChainAction::List => {
            let chains = list_chains(&chains_dir)?;
            if chains.is_empty() {
                println!("No chains in {}", chains_dir.display());
                return Ok(true);
            }
            for c in chains {
                println!(
                    "{:<24} {:>2} steps  {:>2} vars  {}",
                    c.name, c.step_count, c.variable_count, c.description
                );
            }
            Ok(true)
        }
        ChainAction::Show { name } => {
            let (chain, path) = find_chain(&chains_dir, &name)?;
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&chain)?);
            Ok(true)
        }
        ChainAction::Validate { name } => {
            let (chain, _) = find_chain(&chains_dir, &name)?;
            let registry = build_registry(config);
            Ok(report_issues(&chain, &registry))
        }
        ChainAction::Run { name, vars, json } => {
            let (chain, _) = find_chain(&chains_dir, &name)?;
            let registry = build_registry(config);

            if config.chains.validate_before_run && !report_issues(&chain, &registry) {
                return Ok(false);
            }

            let variables: HashMap<String, String> = vars.into_iter().collect();
            run_chain(config, chain, Arc::new(registry), variables, json).await
        }
        ChainAction::Delete { name } => {
            let path = delete_chain(&chains_dir, &name)?;
            println!("Deleted {}", path.display());
            Ok(true)
        }
        ChainAction::Import { file } => {
            let chain = load_chain(&file)
                .map_err(|e| anyhow::anyhow!("failed to load {}: {}", file.display(), e))?;
            let path = save_chain(&chains_dir, &chain)?;
            println!("Imported '{}' to {}", chain.name, path.display());
            Ok(true)
        }
    }
}

/// Report validation issues for `chain` on stderr; `true` when there are none.
fn report_issues(chain: &Chain, registry: &ToolRegistry) -> bool {
    let tool_exists = |name: &str| registry.has_tool(name);
    let issues = validate_chain(chain, Some(&tool_exists));
    if issues.is_empty() {
        eprintln!("Chain '{}' is valid", chain.name);
        return true;
    }

    eprintln!("Chain '{}' has {} issue(s):", chain.name, issues.len());
    for issue in &issues {
        eprintln!("  - {}", issue);
    }
    false
}

async fn run_chain(
    config: &AppConfig,
    chain: Chain,
    registry: Arc<ToolRegistry>,
    variables: HashMap<String, String>,
    json: bool,
) -> anyhow::Result<bool> {
    let event_bus = Arc::new(EventBus::default());

    let log_cancel = CancellationToken::new();
    let log_handle = config.log.enabled.then(|| {
        ChainRunLogger::new(config.log_dir(), config.log.level).spawn(
            &event_bus,
            chain.name.clone(),
            log_cancel.clone(),
        )
    });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling chain");
                cancel.cancel();
            }
        })
    };

    let executor: Arc<dyn ToolExecutor> = registry;
    let runner = ChainRunner::new(Some(executor)).with_event_bus(event_bus);
    let outcome = runner.execute_with_cancel(&chain, &variables, cancel).await;
    ctrl_c.abort();

    // Setup failures publish no terminal event, so the logger must be told to stop.
    if outcome.is_err() {
        log_cancel.cancel();
    }
    if let Some(handle) = log_handle {
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run log saved");
        }
    }

    let result = outcome?;
    print!("{}", render_result(&result, json)?);
    Ok(result.success)
}

/// Stdout rendering of a finished run: the result as JSON, or the summary.
fn render_result(result: &ChainResult, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(format!("{}\n", serde_json::to_string_pretty(result)?))
    } else {
        Ok(result.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_chain::Step;
    use relay_test_utils::ScriptedExecutor;

    async fn run_two_steps(exec: ScriptedExecutor) -> ChainResult {
        let chain = Chain::new("digest")
            .with_step(Step::new("fetch", "read"))
            .with_step(Step::new("save", "write").depends_on(["fetch"]));
        ChainRunner::new(Some(Arc::new(exec)))
            .execute(&chain, &HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_output_is_a_single_document() {
        let result = run_two_steps(ScriptedExecutor::new().succeed("read", "hello")).await;

        let out = render_result(&result, true).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["chain_name"], "digest");
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["step_results"][0]["output"], "hello");
        assert_eq!(parsed["step_results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_json_output_for_failed_run() {
        let result = run_two_steps(ScriptedExecutor::new().fail("read", "no such file")).await;

        let out = render_result(&result, true).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["success"], false);
        assert!(parsed["error"].as_str().unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn test_text_output_is_summary() {
        let result = run_two_steps(ScriptedExecutor::new()).await;
        assert_eq!(render_result(&result, false).unwrap(), result.summary());
    }
}
