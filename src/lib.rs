//! Gmail Organizer
//!
//! Sorts a Gmail account into a fixed label hierarchy: builds the hierarchy,
//! migrates messages out of legacy labels, removes labels left empty, and
//! categorizes messages with ordered header rules.
//!
//! # Overview
//!
//! - **Taxonomy**: canonical hierarchy, categorization rules and migration map, validated at load time
//! - **Classification**: union of every matching rule, with a review label fallback
//! - **Migration**: deterministic plan from leaf-then-path matching, applied label by label with checkpoints
//! - **Remote calls**: one token bucket and an exponential-backoff retry wrap every Gmail API call
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_organizer::{auth, cli, config::Config, pipeline::{Organizer, RunOptions}, taxonomy::Taxonomy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let taxonomy = Taxonomy::builtin()?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-organizer/token.json".as_ref(),
//!         false,
//!     ).await?;
//!     let store = cli::build_store(hub, &config)?;
//!
//!     let options = RunOptions { dry_run: true, migrate: true, ..Default::default() };
//!     let report = Organizer::new(&store, &taxonomy, &config).run(&options).await?;
//!     println!("{}", report.to_markdown());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Label store trait and the rate-limited Gmail implementation
//! - [`classifier`] - Header rule evaluation
//! - [`cleaner`] - Empty legacy label removal
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`hierarchy`] - Hierarchy creation
//! - [`migration`] - Migration planning and execution
//! - [`models`] - Core data structures
//! - [`pipeline`] - Stage orchestration
//! - [`rate_limiter`] - Token bucket
//! - [`report`] - JSON and Markdown reports
//! - [`retry`] - Retry policy and caller
//! - [`state`] - Run state with checkpointing
//! - [`taxonomy`] - Label tables and compiled rules

pub mod auth;
pub mod classifier;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod migration;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod state;
pub mod taxonomy;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, OrganizerError, Result};

pub use models::{
    CategorizationStats, Header, Label, LabelMap, LabelOutcome, LabelType, MessagePage, MessageRef,
    MigrationPlan, MigrationPlanEntry, MigrationStats,
};

pub use classifier::Classifier;
pub use cleaner::LabelCleaner;
pub use client::{GmailLabelStore, LabelStore};
pub use config::Config;
pub use hierarchy::{HierarchyBuilder, HierarchyOutcome};
pub use migration::{MigrationCheckpoint, MigrationExecutor, MigrationPlanner, NoCheckpoint};
pub use pipeline::{Organizer, RunOptions};
pub use rate_limiter::TokenBucket;
pub use report::Report;
pub use retry::{RetryPolicy, RetryingCaller, Sleeper};
pub use state::{RunStage, RunState};
pub use taxonomy::Taxonomy;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
