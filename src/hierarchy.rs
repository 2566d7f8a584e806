//! Creates whatever part of the canonical hierarchy the account is missing

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::LabelStore;
use crate::error::{OrganizerError, Result};
use crate::models::{label_map, LabelMap};
use crate::taxonomy::Taxonomy;

/// Result of one [`HierarchyBuilder::ensure`] pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyOutcome {
    /// Every remote label name -> id, hierarchy included
    pub label_map: LabelMap,
    /// Hierarchy paths created by this pass
    pub created: Vec<String>,
    /// Hierarchy paths that could not be created
    pub failed: Vec<String>,
}

impl HierarchyOutcome {
    pub fn total(&self) -> usize {
        self.label_map.len()
    }
}

pub struct HierarchyBuilder<'a> {
    store: &'a dyn LabelStore,
    taxonomy: &'a Taxonomy,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(store: &'a dyn LabelStore, taxonomy: &'a Taxonomy) -> Self {
        Self { store, taxonomy }
    }

    /// List once, create every missing hierarchy path in declaration order
    ///
    /// A duplicate-name conflict means another writer created the label first;
    /// the builder re-lists and takes the existing id. Any other create failure
    /// is logged and recorded in `failed`, and the pass continues.
    pub async fn ensure(&self) -> Result<HierarchyOutcome> {
        let existing = self.store.list_labels().await?;
        let mut outcome = HierarchyOutcome {
            label_map: label_map(&existing),
            ..Default::default()
        };

        for path in self.taxonomy.hierarchy() {
            if outcome.label_map.contains_key(path) {
                continue;
            }

            match self.store.create_label(path).await {
                Ok(label) => {
                    info!("Created label: {}", path);
                    outcome.label_map.insert(path.clone(), label.id);
                    outcome.created.push(path.clone());
                }
                Err(e) if e.is_conflict() => {
                    warn!("Label {} already exists remotely, re-listing", path);
                    match self.absorb_existing(path, &mut outcome.label_map).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!("Label {} reported as existing but not listed", path);
                            outcome.failed.push(path.clone());
                        }
                        Err(e) => {
                            warn!("Failed to re-list labels after conflict on {}: {}", path, e);
                            outcome.failed.push(path.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to create label '{}': {}", path, e);
                    outcome.failed.push(path.clone());
                }
            }
        }

        info!(
            "Label hierarchy: {} total, {} created",
            outcome.total(),
            outcome.created.len()
        );
        Ok(outcome)
    }

    /// Merge a fresh listing into `map`; true when `path` is now present
    async fn absorb_existing(&self, path: &str, map: &mut LabelMap) -> Result<bool> {
        let labels = self.store.list_labels().await?;
        for label in labels {
            map.entry(label.name).or_insert(label.id);
        }
        Ok(map.contains_key(path))
    }
}

/// Target id for a hierarchy label, as a [`OrganizerError::LabelError`] when missing
pub fn require_id<'m>(map: &'m LabelMap, name: &str) -> Result<&'m str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| OrganizerError::LabelError(format!("Target label not found: {}", name)))
}
