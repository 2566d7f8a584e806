use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Label name -> remote label id, rebuilt from a listing on every run
pub type LabelMap = HashMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    /// Pre-existing mailbox labels (INBOX, SENT, CATEGORY_*). Never created or deleted.
    System,
    User,
}

impl LabelType {
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            Some(t) if t.eq_ignore_ascii_case("system") => LabelType::System,
            _ => LabelType::User,
        }
    }
}

/// A remote label as listed by the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub label_type: LabelType,
    /// Total messages carrying the label, when the store reported it
    pub messages_total: Option<u32>,
}

impl Label {
    pub fn user(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            label_type: LabelType::User,
            messages_total: None,
        }
    }

    pub fn system(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            label_type: LabelType::System,
            messages_total: None,
        }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.messages_total = Some(total);
        self
    }

    /// Final path component ("C" for "A/B/C")
    pub fn leaf(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Build the name -> id lookup from a full listing
pub fn label_map(labels: &[Label]) -> LabelMap {
    labels
        .iter()
        .map(|label| (label.name.clone(), label.id.clone()))
        .collect()
}

/// A single message header as returned in metadata format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

/// One page of a message listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

/// One planned relocation of a legacy label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationPlanEntry {
    pub source_label: String,
    pub source_id: String,
    pub target_label: String,
    pub known_item_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<MigrationPlanEntry>,
}

impl MigrationPlan {
    pub fn new(entries: Vec<MigrationPlanEntry>) -> Self {
        Self {
            generated_at: Utc::now(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn known_item_total(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.known_item_count))
            .sum()
    }
}

/// Result of migrating a single plan entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelOutcome {
    pub source_label: String,
    pub target_label: String,
    pub items_moved: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationStats {
    pub labels_migrated: usize,
    pub items_moved: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizationStats {
    pub total_processed: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub errors: usize,
    pub label_counts: BTreeMap<String, usize>,
}

impl CategorizationStats {
    /// Labels sorted by count descending, then name
    pub fn top_labels(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .label_counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts.truncate(limit);
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_leaf() {
        assert_eq!(Label::user("1", "Old/Stuff/Legal").leaf(), "Legal");
        assert_eq!(Label::user("2", "bank").leaf(), "bank");
    }

    #[test]
    fn test_label_type_from_api() {
        assert_eq!(LabelType::from_api(Some("system")), LabelType::System);
        assert_eq!(LabelType::from_api(Some("user")), LabelType::User);
        assert_eq!(LabelType::from_api(None), LabelType::User);
    }

    #[test]
    fn test_label_map() {
        let labels = vec![Label::system("INBOX", "INBOX"), Label::user("L1", "bank")];
        let map = label_map(&labels);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("bank"), Some(&"L1".to_string()));
    }

    #[test]
    fn test_top_labels_ordering() {
        let mut stats = CategorizationStats::default();
        stats.label_counts.insert("NEWSLETTERS".to_string(), 3);
        stats.label_counts.insert("FLAGGED-REVIEW".to_string(), 5);
        stats.label_counts.insert("MUSIC".to_string(), 3);

        let top = stats.top_labels(2);
        assert_eq!(top, vec![("FLAGGED-REVIEW", 5), ("MUSIC", 3)]);
    }

    #[test]
    fn test_plan_known_item_total() {
        let plan = MigrationPlan::new(vec![
            MigrationPlanEntry {
                source_label: "bank".to_string(),
                source_id: "L1".to_string(),
                target_label: "TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase".to_string(),
                known_item_count: 4,
            },
            MigrationPlanEntry {
                source_label: "music".to_string(),
                source_id: "L2".to_string(),
                target_label: "MUSIC".to_string(),
                known_item_count: 6,
            },
        ]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.known_item_total(), 10);
    }
}
