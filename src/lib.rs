//! # Automaton
//!
//! A declarative browser-automation workflow engine. An automation is a flat
//! list of actions (navigation, interaction, probes, variables, structured
//! control flow) interpreted against a Chrome/Chromium browser over the
//! DevTools protocol, plus a stateful generation-download manager that walks
//! a virtualized gallery, de-duplicates against an append-only log, and
//! resumes correctly across runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use automaton::{AutomationConfig, BrowserDriver, Interpreter, ResolvedProgram};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AutomationConfig::load(std::path::Path::new("run.json")).await?;
//!     let program = ResolvedProgram::resolve(config.actions.clone())?;
//!     let driver = BrowserDriver::launch(&config).await?;
//!
//!     let mut interpreter = Interpreter::with_driver(program, driver);
//!     let outcome = interpreter.run().await;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Print the action vocabulary
//! automaton list-actions
//!
//! # Scaffold, validate and execute a configuration
//! automaton create -n demo -u https://example.com -o demo.json
//! automaton validate -c demo.json
//! automaton run -c demo.json --show-browser
//! ```

/// Action records, the action vocabulary and per-kind validation
pub mod action;

/// Browser driver facade over chromiumoxide
pub mod browser;

/// Command-line interface implementation
pub mod cli;

/// Condition vocabulary for IF/WHILE/SKIP_IF/CONDITIONAL_WAIT
pub mod condition;

/// Configuration loading and browser launch settings
pub mod config;

/// Per-run execution state and variable substitution
pub mod context;

/// Append-only download log and duplicate index
pub mod download_log;

/// Error types and failure summaries
pub mod error;

/// Load-time control-flow resolution
pub mod flow;

/// Generation-download manager (gallery crawler)
pub mod gallery;

/// The action interpreter
pub mod interpreter;

/// Metadata extraction helpers and file naming
pub mod metadata;

/// Run metrics collection
pub mod metrics;

/// Boundary scroll management for virtualized lists
pub mod scroll;

#[cfg(test)]
mod tests;

pub use action::*;
pub use browser::*;
pub use cli::*;
pub use condition::*;
pub use config::*;
pub use context::*;
pub use download_log::*;
pub use error::*;
pub use flow::*;
pub use gallery::*;
pub use interpreter::*;
pub use metadata::*;
// `self::` disambiguates from the metrics crate.
pub use self::metrics::RunMetrics;
pub use scroll::*;
