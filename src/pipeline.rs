//! Top-level assembly: drives one run's stages against a [`LabelStore`]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::cleaner::LabelCleaner;
use crate::client::LabelStore;
use crate::config::Config;
use crate::error::Result;
use crate::hierarchy::HierarchyBuilder;
use crate::migration::{MigrationCheckpoint, MigrationExecutor, MigrationPlanner};
use crate::models::{CategorizationStats, LabelMap, LabelOutcome, MigrationPlan};
use crate::report::{save_plan, MigrationSummary, Report};
use crate::state::{RunStage, RunState};
use crate::taxonomy::Taxonomy;

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StageEntered(RunStage),
    PlanReady { entries: usize },
    LabelMigrated { source_label: String, items_moved: usize },
    MessagesProcessed(usize),
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// What a single run should do
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Stop once the hierarchy exists
    pub labels_only: bool,
    pub migrate: bool,
    pub cleanup: bool,
    /// Categorize even when migrate or cleanup is requested
    pub categorize: bool,
    /// 0 means no limit
    pub max_messages: usize,
    pub resume: bool,
}

impl RunOptions {
    /// Categorization is the default mode, and runs alongside
    /// migrate/cleanup only when asked for explicitly
    pub fn runs_categorization(&self) -> bool {
        !self.labels_only && (self.categorize || (!self.migrate && !self.cleanup))
    }
}

pub struct Organizer<'a> {
    store: &'a dyn LabelStore,
    taxonomy: &'a Taxonomy,
    config: &'a Config,
    progress: Option<ProgressCallback>,
}

impl<'a> Organizer<'a> {
    pub fn new(store: &'a dyn LabelStore, taxonomy: &'a Taxonomy, config: &'a Config) -> Self {
        Self {
            store,
            taxonomy,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Run every requested stage in order and return the summary
    ///
    /// The hierarchy pass always runs, since the name to id map is rebuilt
    /// from a fresh listing on every run. State is checkpointed after each
    /// stage and after every migrated label.
    pub async fn run(&self, options: &RunOptions) -> Result<Report> {
        let state_path = self.config.output.state_path();
        let mut state = if options.resume {
            RunState::resume(&state_path, options.dry_run).await?
        } else {
            RunState::new(options.dry_run)
        };
        info!(
            "Starting run {} ({})",
            state.run_id,
            if options.dry_run { "dry run" } else { "execute" }
        );

        let mut report = Report::new(&state.run_id, state.started_at, options.dry_run);

        // Hierarchy
        let hierarchy = HierarchyBuilder::new(self.store, self.taxonomy).ensure().await?;
        report.label_count = hierarchy.total();
        report.labels_created = hierarchy.created.clone();
        report.labels_failed = hierarchy.failed.clone();
        self.enter(&mut state, RunStage::HierarchyEnsured, &state_path).await?;

        if options.labels_only {
            self.enter(&mut state, RunStage::Done, &state_path).await?;
            report.finish();
            return Ok(report);
        }

        if options.migrate {
            let plan = self.plan().await?;
            self.enter(&mut state, RunStage::MigrationPlanned, &state_path).await?;

            let executor = MigrationExecutor::new(self.store, self.config.api.batch_size);
            let mut checkpoint = StateCheckpoint {
                state: &mut state,
                path: &state_path,
                progress: self.progress.as_ref(),
            };
            let stats = executor
                .execute(&plan, &hierarchy.label_map, options.dry_run, &mut checkpoint)
                .await;

            report.migration = Some(MigrationSummary {
                planned_labels: plan.len(),
                stats,
                outcomes: state.label_outcomes.clone(),
            });
            self.enter(&mut state, RunStage::MigrationExecuted, &state_path).await?;
        }

        if options.cleanup {
            let removed = LabelCleaner::new(self.store, self.taxonomy)
                .cleanup_empty_labels(options.dry_run)
                .await?;
            report.labels_removed = Some(removed);
            self.enter(&mut state, RunStage::Cleaned, &state_path).await?;
        }

        if options.runs_categorization() {
            self.enter(&mut state, RunStage::Categorizing, &state_path).await?;
            let stats = self
                .categorize_messages(&hierarchy.label_map, options.dry_run, options.max_messages)
                .await;
            report.categorization = Some(stats);
        }

        self.enter(&mut state, RunStage::Done, &state_path).await?;
        report.finish();
        info!("Run {} finished in {}s", report.run_id, report.duration_seconds);
        Ok(report)
    }

    /// List labels, compute the migration plan and write it to the plan file
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let labels = self.store.list_labels().await?;
        let plan = MigrationPlanner::new(self.taxonomy).plan(&labels);
        save_plan(&plan, &self.config.output.plan_path()).await?;
        self.notify(ProgressEvent::PlanReady { entries: plan.len() });
        Ok(plan)
    }

    /// Classify messages across the whole mailbox, labeling them unless `dry_run`
    ///
    /// Per-message failures are counted and skipped. A listing failure ends
    /// the pass with what has been processed so far.
    pub async fn categorize_messages(
        &self,
        label_map: &LabelMap,
        dry_run: bool,
        max_messages: usize,
    ) -> CategorizationStats {
        let classifier = Classifier::new(self.taxonomy);
        let batch_size = self.config.api.batch_size.max(1) as usize;
        let mut stats = CategorizationStats::default();
        let mut remaining = if max_messages == 0 { usize::MAX } else { max_messages };
        let mut page_token: Option<String> = None;

        while remaining > 0 {
            let page_size = batch_size.min(remaining) as u32;
            let page = match self.store.list_messages(&[], page_size, page_token.take()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Failed to list messages: {}", e);
                    stats.errors += 1;
                    break;
                }
            };
            if page.messages.is_empty() {
                break;
            }

            for message in page.messages.iter().take(remaining) {
                remaining -= 1;
                if let Err(e) = self
                    .categorize_message(&classifier, &message.id, label_map, dry_run, &mut stats)
                    .await
                {
                    error!("Error processing message {}: {}", message.id, e);
                    stats.errors += 1;
                }
            }
            self.notify(ProgressEvent::MessagesProcessed(stats.total_processed));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if max_messages > 0 && remaining == 0 {
            info!("Reached max_messages limit ({}). Stopping.", max_messages);
        }
        info!(
            "Categorization: {} processed, {} categorized, {} uncategorized, {} errors",
            stats.total_processed, stats.categorized, stats.uncategorized, stats.errors
        );
        stats
    }

    async fn categorize_message(
        &self,
        classifier: &Classifier<'_>,
        message_id: &str,
        label_map: &LabelMap,
        dry_run: bool,
        stats: &mut CategorizationStats,
    ) -> Result<()> {
        let headers = self.store.get_message_headers(message_id).await?;
        let labels = classifier.categorize(&headers);

        stats.total_processed += 1;
        if classifier.is_categorized(&labels) {
            stats.categorized += 1;
        } else {
            stats.uncategorized += 1;
        }
        for label in &labels {
            *stats.label_counts.entry(label.clone()).or_insert(0) += 1;
        }
        debug!("Message {} -> {:?}", message_id, labels);

        if dry_run {
            return Ok(());
        }

        let add: Vec<String> = labels
            .iter()
            .filter_map(|name| match label_map.get(name) {
                Some(id) => Some(id.clone()),
                None => {
                    warn!("Label {} has no remote id, not applying it", name);
                    None
                }
            })
            .collect();
        if add.is_empty() {
            return Ok(());
        }
        self.store.modify_message(message_id, &add, &[]).await
    }

    async fn enter(&self, state: &mut RunState, stage: RunStage, path: &Path) -> Result<()> {
        // A resumed run re-enters stages it already passed
        if stage > state.stage {
            state.advance(stage, path).await?;
        }
        self.notify(ProgressEvent::StageEntered(stage));
        Ok(())
    }
}

/// Persists per-label migration progress into the run state
struct StateCheckpoint<'s> {
    state: &'s mut RunState,
    path: &'s Path,
    progress: Option<&'s ProgressCallback>,
}

#[async_trait]
impl<'s> MigrationCheckpoint for StateCheckpoint<'s> {
    fn is_completed(&self, source_label: &str) -> bool {
        self.state.is_label_completed(source_label)
    }

    async fn label_finished(&mut self, outcome: &LabelOutcome) -> Result<()> {
        if let Some(progress) = self.progress {
            progress(ProgressEvent::LabelMigrated {
                source_label: outcome.source_label.clone(),
                items_moved: outcome.items_moved,
            });
        }
        self.state.record_label(outcome.clone(), self.path).await
    }
}
