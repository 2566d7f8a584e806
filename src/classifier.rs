//! Rule-based message classification against the label hierarchy

use crate::models::Header;
use crate::taxonomy::{CategorizationRule, Taxonomy};

/// Value of the first header named `name` (case-insensitive), or "" when absent
pub fn extract_header<'h>(headers: &'h [Header], name: &str) -> &'h str {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
        .unwrap_or("")
}

/// The header values a rule can test. From and To are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFields<'h> {
    pub from: String,
    pub to: String,
    pub subject: &'h str,
    pub list_unsubscribe: &'h str,
}

impl<'h> MessageFields<'h> {
    pub fn from_headers(headers: &'h [Header]) -> Self {
        Self {
            from: extract_header(headers, "From").to_lowercase(),
            to: extract_header(headers, "To").to_lowercase(),
            subject: extract_header(headers, "Subject"),
            list_unsubscribe: extract_header(headers, "List-Unsubscribe"),
        }
    }
}

impl CategorizationRule {
    /// Every present predicate must match
    pub fn matches(&self, fields: &MessageFields<'_>) -> bool {
        if let Some(from) = &self.from {
            if !from.is_match(&fields.from) {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if !to.is_match(&fields.to) {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !subject.is_match(fields.subject) {
                return false;
            }
        }
        if self.requires_unsubscribe && fields.list_unsubscribe.is_empty() {
            return false;
        }
        true
    }
}

/// Maps message headers to hierarchy labels
///
/// Rules are independent: every matching rule contributes its labels, in
/// declaration order, without duplicates. A message no rule matches gets the
/// review label alone.
pub struct Classifier<'a> {
    taxonomy: &'a Taxonomy,
}

impl<'a> Classifier<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn categorize(&self, headers: &[Header]) -> Vec<String> {
        let fields = MessageFields::from_headers(headers);
        let mut labels: Vec<String> = Vec::new();

        for rule in self.taxonomy.categorization_rules() {
            if !rule.matches(&fields) {
                continue;
            }
            tracing::trace!("Rule {} matched", rule.name);
            for label in &rule.labels {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }

        if labels.is_empty() {
            labels.push(self.taxonomy.sentinel().to_string());
        }
        labels
    }

    /// Names of the rules that match, for diagnostics
    pub fn matching_rules(&self, headers: &[Header]) -> Vec<&'a str> {
        let fields = MessageFields::from_headers(headers);
        self.taxonomy
            .categorization_rules()
            .iter()
            .filter(|rule| rule.matches(&fields))
            .map(|rule| rule.name.as_str())
            .collect()
    }

    /// False when the result is only the review label
    pub fn is_categorized(&self, labels: &[String]) -> bool {
        !(labels.len() == 1 && labels[0] == self.taxonomy.sentinel())
    }
}
