//! Relocating legacy labels into the hierarchy
//!
//! [`MigrationPlanner`] is a pure function of the remote label listing and the
//! migration table. [`MigrationExecutor`] applies a plan one label at a time,
//! moving each message with a single add-target/remove-source mutation.
//! Re-running a partially applied plan is safe: moved messages no longer
//! carry the source label, so the next listing skips them.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::client::{message_ids, LabelStore};
use crate::error::{OrganizerError, Result};
use crate::hierarchy::require_id;
use crate::models::{Label, LabelMap, LabelOutcome, LabelType, MigrationPlan, MigrationPlanEntry, MigrationStats};
use crate::taxonomy::{is_system_label_name, Taxonomy};

pub struct MigrationPlanner<'a> {
    taxonomy: &'a Taxonomy,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self { taxonomy }
    }

    /// Hierarchy target for a legacy label name
    ///
    /// Each pattern is tried against the leaf segment, then the full path; the
    /// first pattern matching either wins.
    pub fn find_migration_target(&self, label_name: &str) -> Option<&'a str> {
        let leaf = label_name.rsplit('/').next().unwrap_or(label_name);
        self.taxonomy
            .migration_rules()
            .iter()
            .find(|rule| rule.matches_label(leaf, label_name))
            .map(|rule| rule.target.as_str())
    }

    /// False for system labels and anything already in or under the hierarchy
    pub fn is_plannable(&self, label: &Label) -> bool {
        label.label_type != LabelType::System
            && !is_system_label_name(&label.name)
            && !self.taxonomy.covers(&label.name)
    }

    /// Entries follow the order of `labels`; unmatched labels are left out
    pub fn plan(&self, labels: &[Label]) -> MigrationPlan {
        let entries: Vec<MigrationPlanEntry> = labels
            .iter()
            .filter(|label| self.is_plannable(label))
            .filter_map(|label| match self.find_migration_target(&label.name) {
                Some(target) => Some(MigrationPlanEntry {
                    source_label: label.name.clone(),
                    source_id: label.id.clone(),
                    target_label: target.to_string(),
                    known_item_count: label.messages_total.unwrap_or(0),
                }),
                None => {
                    debug!("No migration target for label {}", label.name);
                    None
                }
            })
            .collect();

        info!(
            "Migration plan: {} of {} labels have a target",
            entries.len(),
            labels.len()
        );
        MigrationPlan::new(entries)
    }
}

/// Per-label progress hook for [`MigrationExecutor::execute`]
#[async_trait]
pub trait MigrationCheckpoint: Send {
    /// Entries reported completed are skipped
    fn is_completed(&self, _source_label: &str) -> bool {
        false
    }

    /// Called after each label finishes, before the next one starts
    async fn label_finished(&mut self, outcome: &LabelOutcome) -> Result<()>;
}

/// Checkpoint that records nothing
pub struct NoCheckpoint;

#[async_trait]
impl MigrationCheckpoint for NoCheckpoint {
    async fn label_finished(&mut self, _outcome: &LabelOutcome) -> Result<()> {
        Ok(())
    }
}

pub struct MigrationExecutor<'a> {
    store: &'a dyn LabelStore,
    batch_size: u32,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(store: &'a dyn LabelStore, batch_size: u32) -> Self {
        Self { store, batch_size }
    }

    /// Apply `plan` using `targets` for target ids
    ///
    /// Never creates labels: an entry whose target id is missing counts as an
    /// error and is skipped. In dry-run mode no listing or mutation happens and
    /// only `labels_migrated` advances.
    pub async fn execute(
        &self,
        plan: &MigrationPlan,
        targets: &LabelMap,
        dry_run: bool,
        checkpoint: &mut dyn MigrationCheckpoint,
    ) -> MigrationStats {
        let mut stats = MigrationStats::default();

        for entry in &plan.entries {
            if checkpoint.is_completed(&entry.source_label) {
                debug!("Skipping already migrated label {}", entry.source_label);
                continue;
            }

            let target_id = match require_id(targets, &entry.target_label) {
                Ok(id) => id,
                Err(e) => {
                    warn!("{} (needed by {})", e, entry.source_label);
                    stats.errors += 1;
                    continue;
                }
            };

            info!(
                "{}Migrating: {} -> {}",
                if dry_run { "[DRY RUN] " } else { "" },
                entry.source_label,
                entry.target_label
            );

            let outcome = if dry_run {
                LabelOutcome {
                    source_label: entry.source_label.clone(),
                    target_label: entry.target_label.clone(),
                    items_moved: 0,
                    errors: 0,
                }
            } else {
                match self.migrate_label(entry, target_id).await {
                    Ok(outcome) => outcome,
                    Err((outcome, e)) => {
                        error!("Migration error for {}: {}", entry.source_label, e);
                        stats.items_moved += outcome.items_moved;
                        stats.errors += outcome.errors + 1;
                        continue;
                    }
                }
            };

            stats.labels_migrated += 1;
            stats.items_moved += outcome.items_moved;
            stats.errors += outcome.errors;

            if let Err(e) = checkpoint.label_finished(&outcome).await {
                warn!("Failed to checkpoint {}: {}", entry.source_label, e);
            }
        }

        info!(
            "Migration finished: {} labels, {} items moved, {} errors",
            stats.labels_migrated, stats.items_moved, stats.errors
        );
        stats
    }

    /// Move every item of one source label. A listing failure stops the label
    /// and is returned alongside what was moved before it.
    async fn migrate_label(
        &self,
        entry: &MigrationPlanEntry,
        target_id: &str,
    ) -> std::result::Result<LabelOutcome, (LabelOutcome, OrganizerError)> {
        let mut outcome = LabelOutcome {
            source_label: entry.source_label.clone(),
            target_label: entry.target_label.clone(),
            items_moved: 0,
            errors: 0,
        };
        let add = [target_id.to_string()];
        let remove = [entry.source_id.clone()];

        let ids = message_ids(self.store, vec![entry.source_id.clone()], self.batch_size);
        futures::pin_mut!(ids);

        while let Some(next) = ids.next().await {
            let message_id = match next {
                Ok(id) => id,
                Err(e) => return Err((outcome, e)),
            };

            match self.store.modify_message(&message_id, &add, &remove).await {
                Ok(()) => outcome.items_moved += 1,
                Err(e) => {
                    error!("Error moving message {}: {}", message_id, e);
                    outcome.errors += 1;
                }
            }
        }

        debug!(
            "Label {} moved {} items with {} errors",
            entry.source_label, outcome.items_moved, outcome.errors
        );
        Ok(outcome)
    }
}
