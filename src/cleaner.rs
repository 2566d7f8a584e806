//! Deletion of legacy labels left empty after migration

use tracing::{debug, error, info};

use crate::client::LabelStore;
use crate::error::Result;
use crate::models::{Label, LabelType};
use crate::taxonomy::{is_system_label_name, Taxonomy};

/// Removes user labels that no longer carry any messages
pub struct LabelCleaner<'a> {
    store: &'a dyn LabelStore,
    taxonomy: &'a Taxonomy,
}

impl<'a> LabelCleaner<'a> {
    pub fn new(store: &'a dyn LabelStore, taxonomy: &'a Taxonomy) -> Self {
        Self { store, taxonomy }
    }

    /// Labels the cleaner may consider at all
    pub fn is_candidate(&self, label: &Label) -> bool {
        label.label_type != LabelType::System
            && !is_system_label_name(&label.name)
            && !self.taxonomy.covers(&label.name)
    }

    /// Delete (or in dry-run, report) every empty candidate label. Returns the count.
    ///
    /// Emptiness is decided from a fresh per-label lookup, never from the
    /// listing. A label whose lookup fails is left alone.
    pub async fn cleanup_empty_labels(&self, dry_run: bool) -> Result<usize> {
        let labels = self.store.list_labels().await?;
        let mut removed = 0;

        for label in labels.iter().filter(|label| self.is_candidate(label)) {
            let live = match self.store.get_label(&label.id).await {
                Ok(live) => live,
                Err(e) => {
                    error!("Error checking label {}: {}", label.name, e);
                    continue;
                }
            };

            let total = live.messages_total.unwrap_or(0);
            if total > 0 {
                debug!("Keeping label {} ({} messages)", label.name, total);
                continue;
            }

            info!(
                "{}Removing empty label: {}",
                if dry_run { "[DRY RUN] " } else { "" },
                label.name
            );
            if !dry_run {
                if let Err(e) = self.store.delete_label(&label.id).await {
                    error!("Failed to delete label {}: {}", label.name, e);
                    continue;
                }
            }
            removed += 1;
        }

        info!("Label cleanup: {} empty labels removed", removed);
        Ok(removed)
    }
}
