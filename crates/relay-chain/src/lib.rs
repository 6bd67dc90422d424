//! Chain engine: declarative multi-step tool workflows.
//!
//! A [`Chain`] is an ordered list of [`Step`]s, each invoking one named tool
//! with JSON parameters that may carry `{{variable}}` markers. Steps declare
//! dependencies on each other; the [`ChainRunner`] orders them with
//! [`topological_sort`], substitutes variables, and invokes a
//! [`ToolExecutor`](relay_core::traits::ToolExecutor) step by step, applying
//! each step's stop/skip/retry policy on failure.
//!
//! Chains are persisted one JSON file per chain (see [`store`]) and can be
//! checked up front with [`validate_chain`].

pub mod chain;
pub mod resolver;
pub mod run_log;
pub mod runner;
pub mod store;
pub mod template;
pub mod validator;

pub use chain::{Chain, ChainResult, ErrorPolicy, Params, Step, StepResult, Variable};
pub use resolver::topological_sort;
pub use run_log::ChainRunLogger;
pub use runner::{resolve_variables, ChainRunner};
pub use store::{
    delete_chain, find_chain, list_chains, load_chain, sanitize_filename, save_chain,
    ChainSummary,
};
pub use template::{extract_variable_refs, substitute_vars};
pub use validator::{validate_chain, ValidationIssue};
