mod chain_cli;

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::config::{dirs_home, AppConfig};
use relay_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "relay", version, about = "Declarative tool chains for AI agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage and run chains
    Chain {
        #[command(subcommand)]
        action: ChainAction,
    },
    /// List registered tools
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub(crate) enum ChainAction {
    /// List stored chains
    List,
    /// Print a chain definition as JSON
    Show {
        /// Chain name
        name: String,
    },
    /// Check a chain for structural problems
    Validate {
        /// Chain name
        name: String,
    },
    /// Execute a chain
    Run {
        /// Chain name
        name: String,
        /// Variable value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored chain
    Delete {
        /// Chain name
        name: String,
    },
    /// Copy a chain JSON file into the chains directory
    Import {
        /// Path to the chain file
        file: PathBuf,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "relay", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Chain { action } => {
            let succeeded = chain_cli::handle(&config, action).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Tools => {
            let registry = build_registry(&config);
            for def in registry.definitions() {
                println!("{:<12} {}", def.name, def.description);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Load the config from `path`, then `~/.relay/config.toml`, falling back to defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".relay").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    Ok(AppConfig::default())
}

/// The registry chains run against.
pub(crate) fn build_registry(config: &AppConfig) -> ToolRegistry {
    ToolRegistry::with_builtins()
        .with_working_dir(&config.tools.working_dir)
        .with_default_timeout(config.tools.timeout_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("city=Paris").unwrap(),
            ("city".to_string(), "Paris".to_string())
        );
        assert_eq!(
            parse_var("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_var("empty=").unwrap().1, "");
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "relay", "chain", "run", "digest", "--var", "a=1", "--var", "b=2", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Chain {
                action: ChainAction::Run { name, vars, json },
            } => {
                assert_eq!(name, "digest");
                assert_eq!(vars.len(), 2);
                assert!(json);
            }
            _ => panic!("expected chain run"),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
