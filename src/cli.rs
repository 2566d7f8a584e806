//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{self, GmailHub};
use crate::client::GmailLabelStore;
use crate::config::Config;
use crate::error::Result;
use crate::models::MigrationPlan;
use crate::pipeline::{Organizer, ProgressCallback, ProgressEvent, RunOptions};
use crate::rate_limiter::TokenBucket;
use crate::report::Report;
use crate::retry::{RetryPolicy, RetryingCaller};
use crate::state::RunState;
use crate::taxonomy::Taxonomy;

#[derive(Parser, Debug)]
#[command(name = "gmail-organizer")]
#[command(version)]
#[command(about = "Organize a Gmail account into a fixed label hierarchy", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-organizer/token.json")]
    pub token_cache: PathBuf,

    /// Directory for reports, plan and state (overrides the config file)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Build the hierarchy, then migrate, clean up or categorize
    Run {
        /// Apply changes (the default is a dry run)
        #[arg(long)]
        execute: bool,

        /// Only build the label hierarchy
        #[arg(long)]
        labels_only: bool,

        /// Move messages from legacy labels into the hierarchy
        #[arg(long)]
        migrate: bool,

        /// Delete legacy labels with no messages left
        #[arg(long)]
        cleanup: bool,

        /// Categorize messages even with --migrate or --cleanup
        #[arg(long)]
        categorize: bool,

        /// Stop categorizing after this many messages (0 = no limit)
        #[arg(long)]
        max_messages: Option<usize>,

        /// Resume an interrupted run from the state file
        #[arg(long)]
        resume: bool,
    },

    /// Compute the migration plan without changing anything
    Plan,

    /// Show the state of the current or last run
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spinner messages for pipeline events
fn spinner_progress(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |event| match event {
        ProgressEvent::StageEntered(stage) => pb.set_message(format!("{:?}...", stage)),
        ProgressEvent::PlanReady { entries } => {
            pb.set_message(format!("Migration plan ready ({} labels)", entries))
        }
        ProgressEvent::LabelMigrated {
            source_label,
            items_moved,
        } => pb.set_message(format!(
            "Migrated {} ({} messages)",
            truncate_string(&source_label, 40),
            items_moved
        )),
        ProgressEvent::MessagesProcessed(count) => {
            pb.set_message(format!("Processed {} messages...", count))
        }
    })
}

/// Configuration with command-line overrides, plus the taxonomy it names
pub async fn load_runtime(cli: &Cli) -> Result<(Config, Taxonomy)> {
    let mut config = Config::load(&cli.config).await?;
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }

    let taxonomy = match &config.taxonomy.file {
        Some(path) => Taxonomy::load(path).await?,
        None => Taxonomy::builtin()?,
    };
    Ok((config, taxonomy))
}

/// Gmail store sharing one bucket and retry policy across every call
pub fn build_store(hub: GmailHub, config: &Config) -> Result<GmailLabelStore> {
    let bucket = TokenBucket::new(config.api.calls_per_second, config.api.burst_capacity)?;
    let caller = RetryingCaller::new(bucket, RetryPolicy::from_config(&config.api));
    Ok(GmailLabelStore::new(hub, caller))
}

/// Authenticate, run the pipeline and write both reports
pub async fn run_pipeline(
    cli: &Cli,
    mut options: RunOptions,
    execute: bool,
    max_messages: Option<usize>,
    multi: MultiProgress,
) -> Result<Report> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let (config, taxonomy) = load_runtime(cli).await?;
    options.dry_run = !execute && config.execution.dry_run;
    options.max_messages = max_messages.unwrap_or(config.execution.max_messages);
    reporter.finish_spinner(
        &config_spinner,
        &format!(
            "Configuration loaded ({} hierarchy labels, {} rules)",
            taxonomy.hierarchy().len(),
            taxonomy.categorization_rules().len()
        ),
    );

    if options.dry_run {
        let _ = reporter
            .multi_progress()
            .println("DRY RUN MODE - no changes will be made");
    }

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, false).await?;
    let store = build_store(hub, &config)?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    let run_spinner = reporter.add_spinner("Building label hierarchy...");
    let organizer =
        Organizer::new(&store, &taxonomy, &config).with_progress(spinner_progress(run_spinner.clone()));
    let report = organizer.run(&options).await?;
    reporter.finish_spinner(
        &run_spinner,
        &format!(
            "Label hierarchy ready ({} labels, {} created)",
            report.label_count,
            report.labels_created.len()
        ),
    );

    if !options.labels_only {
        report.save_json(&config.output.report_json_path()).await?;
        report.save_markdown(&config.output.report_markdown_path()).await?;
    }
    Ok(report)
}

/// Authenticate, compute the migration plan and write it
pub async fn run_plan(cli: &Cli, multi: MultiProgress) -> Result<(MigrationPlan, PathBuf)> {
    let reporter = ProgressReporter::with_multi_progress(multi);
    let (config, taxonomy) = load_runtime(cli).await?;

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, false).await?;
    let store = build_store(hub, &config)?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    let plan_spinner = reporter.add_spinner("Listing labels...");
    let plan = Organizer::new(&store, &taxonomy, &config).plan().await?;
    reporter.finish_spinner(&plan_spinner, &format!("{} labels to migrate", plan.len()));

    Ok((plan, config.output.plan_path()))
}

pub fn print_report(report: &Report) {
    println!("\n========================================");
    println!("Gmail Organizer Summary");
    println!("========================================");
    println!("Run ID: {}", report.run_id);
    println!("Duration: {} seconds", report.duration_seconds);
    println!("Labels total: {}", report.label_count);
    println!("Labels created: {}", report.labels_created.len());
    if !report.labels_failed.is_empty() {
        println!("Labels failed: {}", report.labels_failed.join(", "));
    }
    if let Some(migration) = &report.migration {
        println!("Labels migrated: {}", migration.stats.labels_migrated);
        println!("Messages moved: {}", migration.stats.items_moved);
        println!("Migration errors: {}", migration.stats.errors);
    }
    if let Some(removed) = report.labels_removed {
        println!("Empty labels removed: {}", removed);
    }
    if let Some(stats) = &report.categorization {
        println!("Messages processed: {}", stats.total_processed);
        println!("Categorized: {}", stats.categorized);
        println!("Uncategorized: {}", stats.uncategorized);
        println!("Errors: {}", stats.errors);
        for (label, count) in stats.top_labels(10) {
            println!("  {:<50} {:>6}", truncate_string(label, 50), count);
        }
    }
    println!("========================================");
}

pub fn print_plan(plan: &MigrationPlan) {
    if plan.is_empty() {
        println!("\nNo legacy labels match a migration rule.");
        return;
    }
    println!("\n{:<40} {:<50} {:>8}", "Source", "Target", "Messages");
    println!("{}", "-".repeat(100));
    for entry in &plan.entries {
        println!(
            "{:<40} {:<50} {:>8}",
            truncate_string(&entry.source_label, 40),
            truncate_string(&entry.target_label, 50),
            entry.known_item_count
        );
    }
    println!(
        "\n{} labels, about {} messages to move",
        plan.len(),
        plan.known_item_total()
    );
}

pub fn print_status(state: &RunState) {
    println!("\n========================================");
    println!("Run State");
    println!("========================================");
    println!("Run ID: {}", state.run_id);
    println!("Started: {}", state.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", state.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Stage: {:?}", state.stage);
    println!("Dry run: {}", state.dry_run);
    println!("Labels migrated: {}", state.completed_labels.len());
    println!("Checkpoints: {}", state.checkpoint_count);
    println!("Resumable: {}", state.can_resume());
    println!("========================================");
}
