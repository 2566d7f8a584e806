use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{OrganizerError, Result};
use crate::models::LabelOutcome;

/// Stages of one run, in execution order. Stages may be skipped but never revisited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunStage {
    Idle,
    HierarchyEnsured,
    MigrationPlanned,
    MigrationExecuted,
    Cleaned,
    Categorizing,
    Done,
}

/// Persisted checkpoint of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stage: RunStage,
    pub dry_run: bool,
    /// Source labels whose migration finished
    pub completed_labels: BTreeSet<String>,
    pub label_outcomes: Vec<LabelOutcome>,
    pub checkpoint_count: usize,
}

impl RunState {
    pub fn new(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            updated_at: now,
            stage: RunStage::Idle,
            dry_run,
            completed_labels: BTreeSet::new(),
            label_outcomes: Vec::new(),
            checkpoint_count: 0,
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved run state to {:?}", path);
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let state: Self = serde_json::from_str(&json).map_err(|e| {
            OrganizerError::StateError(format!("Corrupt state file {:?}: {}", path, e))
        })?;

        tracing::info!(
            "Loaded run state: run_id={}, stage={:?}, completed_labels={}",
            state.run_id,
            state.stage,
            state.completed_labels.len()
        );
        Ok(state)
    }

    /// Continue an unfinished run of the same mode, or start a fresh one
    pub async fn resume(path: &Path, dry_run: bool) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No existing state file found, starting fresh");
            return Ok(Self::new(dry_run));
        }

        let state = Self::load(path).await?;
        if !state.can_resume() {
            tracing::info!("Previous run {} finished, starting fresh", state.run_id);
            return Ok(Self::new(dry_run));
        }
        if state.dry_run != dry_run {
            tracing::warn!(
                "Previous run {} used dry_run={}, not resuming with dry_run={}",
                state.run_id,
                state.dry_run,
                dry_run
            );
            return Ok(Self::new(dry_run));
        }
        Ok(state)
    }

    /// Move forward to `stage` and save. Moving backward is a [`OrganizerError::StateError`].
    pub async fn advance(&mut self, stage: RunStage, path: &Path) -> Result<()> {
        if stage < self.stage {
            return Err(OrganizerError::StateError(format!(
                "cannot move from {:?} back to {:?}",
                self.stage, stage
            )));
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        self.save(path).await?;
        tracing::info!("Stage changed to {:?}", self.stage);
        Ok(())
    }

    /// Record a finished label and checkpoint
    pub async fn record_label(&mut self, outcome: LabelOutcome, path: &Path) -> Result<()> {
        self.completed_labels.insert(outcome.source_label.clone());
        self.label_outcomes.push(outcome);
        self.updated_at = Utc::now();
        self.checkpoint_count += 1;
        self.save(path).await?;
        tracing::debug!(
            "Checkpoint #{}: {} labels migrated",
            self.checkpoint_count,
            self.completed_labels.len()
        );
        Ok(())
    }

    pub fn is_label_completed(&self, source_label: &str) -> bool {
        self.completed_labels.contains(source_label)
    }

    pub fn can_resume(&self) -> bool {
        self.stage != RunStage::Done
    }
}
