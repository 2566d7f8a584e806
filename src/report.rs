//! Run summary exported as JSON and Markdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::models::{CategorizationStats, LabelOutcome, MigrationPlan, MigrationStats};

/// How many labels the Markdown summary lists
const TOP_LABELS: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub planned_labels: usize,
    pub stats: MigrationStats,
    pub outcomes: Vec<LabelOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub dry_run: bool,
    pub label_count: usize,
    pub labels_created: Vec<String>,
    pub labels_failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels_removed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorization: Option<CategorizationStats>,
}

impl Report {
    pub fn new(run_id: &str, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            started_at,
            completed_at: started_at,
            duration_seconds: 0,
            dry_run,
            label_count: 0,
            labels_created: Vec::new(),
            labels_failed: Vec::new(),
            migration: None,
            labels_removed: None,
            categorization: None,
        }
    }

    /// Stamp the completion time
    pub fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_seconds = (self.completed_at - self.started_at).num_seconds();
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if self.dry_run {
            md.push_str("# Gmail Organizer Report (DRY RUN)\n\n");
            md.push_str("> No changes were made. Counts show what WOULD happen.\n\n");
        } else {
            md.push_str("# Gmail Organizer Report\n\n");
        }
        md.push_str(&format!(
            "**Generated:** {}\n\n",
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Label Summary\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Run ID | {} |\n", self.run_id));
        md.push_str(&format!("| Total Labels | {} |\n", self.label_count));
        md.push_str(&format!("| Labels Created | {} |\n", self.labels_created.len()));
        if !self.labels_failed.is_empty() {
            md.push_str(&format!("| Labels Failed | {} |\n", self.labels_failed.len()));
        }
        md.push_str(&format!(
            "| Duration | {}m {}s |\n\n",
            self.duration_seconds / 60,
            self.duration_seconds % 60
        ));

        if let Some(migration) = &self.migration {
            md.push_str("## Migration Summary\n\n");
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Labels Planned | {} |\n", migration.planned_labels));
            md.push_str(&format!("| Labels Migrated | {} |\n", migration.stats.labels_migrated));
            md.push_str(&format!("| Messages Moved | {} |\n", migration.stats.items_moved));
            md.push_str(&format!("| Errors | {} |\n\n", migration.stats.errors));

            if !migration.outcomes.is_empty() {
                md.push_str("| Source | Target | Moved | Errors |\n");
                md.push_str("|--------|--------|-------|--------|\n");
                for outcome in &migration.outcomes {
                    md.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        escape(&outcome.source_label),
                        outcome.target_label,
                        outcome.items_moved,
                        outcome.errors
                    ));
                }
                md.push('\n');
            }
        }

        if let Some(removed) = self.labels_removed {
            md.push_str("## Cleanup\n\n");
            md.push_str(&format!("- **Empty labels removed:** {}\n\n", removed));
        }

        if let Some(stats) = &self.categorization {
            md.push_str("## Categorization Summary\n\n");
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Messages Processed | {} |\n", stats.total_processed));
            md.push_str(&format!("| Categorized | {} |\n", stats.categorized));
            md.push_str(&format!("| Uncategorized | {} |\n", stats.uncategorized));
            md.push_str(&format!("| Errors | {} |\n\n", stats.errors));

            let top = stats.top_labels(TOP_LABELS);
            if !top.is_empty() {
                md.push_str("### Top Labels Applied\n\n");
                for (i, (label, count)) in top.iter().enumerate() {
                    md.push_str(&format!("{}. `{}` ({})\n", i + 1, label, count));
                }
                md.push('\n');
            }
        }

        if self.dry_run {
            md.push_str("---\n\n");
            md.push_str("_To apply these changes, run again with `--execute`._\n");
        }

        md
    }

    pub async fn save_json(&self, path: &Path) -> Result<()> {
        write_creating_parent(path, serde_json::to_string_pretty(self)?).await?;
        tracing::info!("Report exported to {:?}", path);
        Ok(())
    }

    pub async fn save_markdown(&self, path: &Path) -> Result<()> {
        write_creating_parent(path, self.to_markdown()).await?;
        tracing::info!("Markdown report exported to {:?}", path);
        Ok(())
    }
}

/// Write a migration plan as pretty JSON
pub async fn save_plan(plan: &MigrationPlan, path: &Path) -> Result<()> {
    write_creating_parent(path, serde_json::to_string_pretty(plan)?).await?;
    tracing::info!("Migration plan ({} entries) written to {:?}", plan.len(), path);
    Ok(())
}

async fn write_creating_parent(path: &Path, content: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

fn escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}
