//! Chain definitions on disk: one pretty-printed JSON file per chain.
//!
//! Files are named `<sanitized-name>.json`. Lookups try that filename first
//! and fall back to scanning every `.json` file for a case-insensitive match
//! on the chain's internal name. There is no locking; concurrent writers to
//! the same name race.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use relay_core::error::{RelayError, Result};

use crate::chain::Chain;

const SUMMARY_DESCRIPTION_CHARS: usize = 120;

/// Listing entry for a stored chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    pub name: String,
    pub description: String,
    pub step_count: usize,
    pub variable_count: usize,
}

/// Derive the filesystem key for a chain name.
///
/// Lowercases, turns spaces into dashes and drops anything outside
/// `[a-z0-9_-]`. An empty result becomes `"unnamed"`.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Path a chain with this name is saved to.
pub fn chain_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize_filename(name)))
}

/// Read and parse a single chain file.
pub fn load_chain(path: &Path) -> Result<Chain> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a chain into `dir`, creating the directory if needed.
pub fn save_chain(dir: &Path, chain: &Chain) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = chain_path(dir, &chain.name);
    let json = serde_json::to_string_pretty(chain)?;
    std::fs::write(&path, json)?;
    info!(chain = %chain.name, path = %path.display(), "Saved chain");
    Ok(path)
}

/// Summaries of every parseable chain in `dir`, sorted by name.
///
/// A missing directory yields an empty list; unreadable files are skipped.
pub fn list_chains(dir: &Path) -> Result<Vec<ChainSummary>> {
    let mut summaries: Vec<ChainSummary> = json_files(dir)?
        .iter()
        .filter_map(|path| load_or_skip(path))
        .map(|chain| ChainSummary {
            description: truncate_description(&chain.description),
            step_count: chain.steps.len(),
            variable_count: chain.variables.len(),
            name: chain.name,
        })
        .collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}

/// Locate a chain by name, returning it with the file it was loaded from.
///
/// An unparseable file at the direct path counts as a miss.
pub fn find_chain(dir: &Path, name: &str) -> Result<(Chain, PathBuf)> {
    let direct = chain_path(dir, name);
    if direct.is_file() {
        if let Some(chain) = load_or_skip(&direct) {
            return Ok((chain, direct));
        }
    }

    let wanted = name.to_lowercase();
    for path in json_files(dir)? {
        if let Some(chain) = load_or_skip(&path) {
            if chain.name.to_lowercase() == wanted {
                debug!(chain = %name, path = %path.display(), "Found chain by scanning");
                return Ok((chain, path));
            }
        }
    }

    Err(RelayError::ChainNotFound(name.to_string()))
}

/// Remove the file holding the named chain.
pub fn delete_chain(dir: &Path, name: &str) -> Result<PathBuf> {
    let (_, path) = find_chain(dir, name)?;
    std::fs::remove_file(&path)?;
    info!(chain = %name, path = %path.display(), "Deleted chain");
    Ok(path)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %dir.display(), "Chains directory does not exist");
            return Ok(vec![]);
        }
        Err(e) => return Err(e.into()),
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn load_or_skip(path: &Path) -> Option<Chain> {
    match load_chain(path) {
        Ok(chain) => Some(chain),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable chain file");
            None
        }
    }
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() > SUMMARY_DESCRIPTION_CHARS {
        let cut: String = description.chars().take(SUMMARY_DESCRIPTION_CHARS).collect();
        format!("{}...", cut)
    } else {
        description.to_string()
    }
}
