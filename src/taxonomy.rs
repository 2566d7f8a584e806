//! Canonical label hierarchy and the rule tables that target it
//!
//! The tables below are the built-in taxonomy. They are plain data; nothing is
//! compiled until [`Taxonomy::builtin`] (or [`Taxonomy::load`] for a custom
//! TOML file) builds the immutable, validated [`Taxonomy`] that the classifier,
//! planner, hierarchy builder and cleaner borrow for the rest of the run.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{OrganizerError, Result};

/// Applied when no categorization rule matches
pub const SENTINEL_LABEL: &str = "FLAGGED-REVIEW";

/// Name prefixes of mailbox-owned labels that are never planned or deleted
pub const SYSTEM_LABEL_PREFIXES: &[&str] = &[
    "CATEGORY_",
    "CHAT",
    "SENT",
    "INBOX",
    "TRASH",
    "DRAFT",
    "SPAM",
    "STARRED",
    "UNREAD",
    "IMPORTANT",
];

pub const LABEL_HIERARCHY: &[&str] = &[
    // Timeline evidence
    "TIMELINE-EVIDENCE",
    "TIMELINE-EVIDENCE/Communications-Sent",
    "TIMELINE-EVIDENCE/Communications-Sent/Self-Emails",
    "TIMELINE-EVIDENCE/Communications-Sent/To-Contacts",
    "TIMELINE-EVIDENCE/Financial-Transactions",
    "TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase",
    "TIMELINE-EVIDENCE/Financial-Transactions/Robinhood-Investments",
    "TIMELINE-EVIDENCE/Financial-Transactions/Venmo-CashApp",
    "TIMELINE-EVIDENCE/Financial-Transactions/Crypto",
    "TIMELINE-EVIDENCE/Location-Activity",
    "TIMELINE-EVIDENCE/Location-Activity/Google-Maps",
    "TIMELINE-EVIDENCE/Location-Activity/Redfin-Property",
    "TIMELINE-EVIDENCE/Location-Activity/Travel-Transport",
    "TIMELINE-EVIDENCE/Medical",
    "TIMELINE-EVIDENCE/Medical/UC-Health",
    "TIMELINE-EVIDENCE/Medical/Insurance-Claims",
    "TIMELINE-EVIDENCE/Medical/Prescriptions",
    "TIMELINE-EVIDENCE/Government",
    "TIMELINE-EVIDENCE/Government/IRS",
    "TIMELINE-EVIDENCE/Government/SSA",
    "TIMELINE-EVIDENCE/Government/Medicaid-Medicare",
    "TIMELINE-EVIDENCE/Government/SNAP-Benefits",
    "TIMELINE-EVIDENCE/Government/Unemployment",
    "TIMELINE-EVIDENCE/Housing",
    "TIMELINE-EVIDENCE/Housing/Rent-Payments",
    "TIMELINE-EVIDENCE/Housing/Lease-Agreements",
    "TIMELINE-EVIDENCE/Housing/HQS-Inspections",
    "TIMELINE-EVIDENCE/Housing/Utilities",
    "TIMELINE-EVIDENCE/Legal-Court",
    // Music
    "MUSIC",
    "MUSIC/Platforms",
    "MUSIC/Platforms/SoundCloud",
    "MUSIC/Platforms/Spotify",
    "MUSIC/Platforms/Apple-Music",
    "MUSIC/Platforms/YouTube-Music",
    "MUSIC/Platforms/TikTok-Sounds",
    "MUSIC/Distribution",
    "MUSIC/Distribution/DistroKid",
    "MUSIC/Distribution/TuneCore",
    "MUSIC/Distribution/CDBaby",
    "MUSIC/Collaborations",
    "MUSIC/Collaborations/Caresse-Rae-Edna",
    "MUSIC/Copyright-Legal",
    "MUSIC/Copyright-Legal/ASCAP-BMI",
    "MUSIC/Copyright-Legal/Registrations",
    "MUSIC/Royalties",
    "MUSIC/Prompts-Templates",
    // Projects
    "PROJECTS",
    "PROJECTS/SSRN-Academic",
    "PROJECTS/SSRN-Academic/eJournals",
    "PROJECTS/SSRN-Academic/Downloads",
    "PROJECTS/GitHub-Dev",
    "PROJECTS/YumYumCode",
    "PROJECTS/Tiki-Washbot",
    "PROJECTS/Neurooz",
    "PROJECTS/Alt-Text-ADA",
    "PROJECTS/App-Ideas",
    "PROJECTS/Meetaudreyevans",
    "PROJECTS/Mechatronopolis",
    "PROJECTS/Qahwa-Coffee",
    "PROJECTS/Tiki-Wiki-Coffee",
    "PROJECTS/Emergency-Response",
    "PROJECTS/Pet-Insurance-App",
    "PROJECTS/Universal-OZ",
    // Job search
    "JOB-SEARCH",
    "JOB-SEARCH/Applications",
    "JOB-SEARCH/Interviews",
    "JOB-SEARCH/Alerts",
    "JOB-SEARCH/Alerts/Indeed",
    "JOB-SEARCH/Alerts/LinkedIn",
    "JOB-SEARCH/Alerts/Glassdoor",
    "JOB-SEARCH/Offers",
    "JOB-SEARCH/Rejections",
    // API keys / credentials
    "API-KEYS-CREDENTIALS",
    "API-KEYS-CREDENTIALS/API-Keys",
    "API-KEYS-CREDENTIALS/Bot-Tokens",
    "API-KEYS-CREDENTIALS/Passwords",
    "API-KEYS-CREDENTIALS/Licenses",
    // Contacts
    "CONTACTS",
    "CONTACTS/Caresse-Lopez",
    "CONTACTS/Church-One20",
    "CONTACTS/Family",
    "CONTACTS/Professional",
    // Orders / receipts
    "ORDERS-RECEIPTS",
    "ORDERS-RECEIPTS/Amazon",
    "ORDERS-RECEIPTS/eBay",
    "ORDERS-RECEIPTS/Etsy",
    "ORDERS-RECEIPTS/Google-Play",
    "ORDERS-RECEIPTS/Subscriptions",
    "ORDERS-RECEIPTS/Other-Purchases",
    // Newsletters
    "NEWSLETTERS",
    "NEWSLETTERS/Tech",
    "NEWSLETTERS/Music-Industry",
    "NEWSLETTERS/Business",
    // Software tracking
    "SOFTWARE-TRACKING",
    "SOFTWARE-TRACKING/Trials",
    "SOFTWARE-TRACKING/Cancellations",
    "SOFTWARE-TRACKING/Updates",
    // Social media
    "SOCIAL-MEDIA",
    "SOCIAL-MEDIA/TikTok",
    "SOCIAL-MEDIA/LinkedIn",
    "SOCIAL-MEDIA/Reddit",
    "SOCIAL-MEDIA/Nextdoor",
    "SOCIAL-MEDIA/Instagram",
    "SOCIAL-MEDIA/Facebook",
    // Review
    SENTINEL_LABEL,
];

/// Legacy label pattern -> hierarchy target, tested in order
pub const MIGRATION_MAP: &[(&str, &str)] = &[
    // Legal
    (r"^legal", "TIMELINE-EVIDENCE/Legal-Court"),
    (r"^court", "TIMELINE-EVIDENCE/Legal-Court"),
    (r"^attorney", "TIMELINE-EVIDENCE/Legal-Court"),
    // Financial
    (r"^bank", "TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase"),
    (r"^chase", "TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase"),
    (r"^robinhood", "TIMELINE-EVIDENCE/Financial-Transactions/Robinhood-Investments"),
    (r"^venmo", "TIMELINE-EVIDENCE/Financial-Transactions/Venmo-CashApp"),
    (r"^cashapp", "TIMELINE-EVIDENCE/Financial-Transactions/Venmo-CashApp"),
    (r"^crypto", "TIMELINE-EVIDENCE/Financial-Transactions/Crypto"),
    // Medical
    (r"^medical", "TIMELINE-EVIDENCE/Medical"),
    (r"^health", "TIMELINE-EVIDENCE/Medical"),
    (r"^uchealth", "TIMELINE-EVIDENCE/Medical/UC-Health"),
    (r"^doctor", "TIMELINE-EVIDENCE/Medical"),
    (r"^prescri", "TIMELINE-EVIDENCE/Medical/Prescriptions"),
    // Government
    (r"^tax", "TIMELINE-EVIDENCE/Government/IRS"),
    (r"^irs", "TIMELINE-EVIDENCE/Government/IRS"),
    (r"^ssa", "TIMELINE-EVIDENCE/Government/SSA"),
    (r"^social.?security", "TIMELINE-EVIDENCE/Government/SSA"),
    (r"^medicaid", "TIMELINE-EVIDENCE/Government/Medicaid-Medicare"),
    (r"^medicare", "TIMELINE-EVIDENCE/Government/Medicaid-Medicare"),
    (r"^snap", "TIMELINE-EVIDENCE/Government/SNAP-Benefits"),
    (r"^unemploy", "TIMELINE-EVIDENCE/Government/Unemployment"),
    // Housing
    (r"^rent", "TIMELINE-EVIDENCE/Housing/Rent-Payments"),
    (r"^lease", "TIMELINE-EVIDENCE/Housing/Lease-Agreements"),
    (r"^hqs", "TIMELINE-EVIDENCE/Housing/HQS-Inspections"),
    (r"^inspect", "TIMELINE-EVIDENCE/Housing/HQS-Inspections"),
    (r"^utilit", "TIMELINE-EVIDENCE/Housing/Utilities"),
    (r"^electric", "TIMELINE-EVIDENCE/Housing/Utilities"),
    (r"^water.?bill", "TIMELINE-EVIDENCE/Housing/Utilities"),
    // Music
    (r"^music", "MUSIC"),
    (r"^song", "MUSIC"),
    (r"^soundcloud", "MUSIC/Platforms/SoundCloud"),
    (r"^spotify", "MUSIC/Platforms/Spotify"),
    (r"^apple.?music", "MUSIC/Platforms/Apple-Music"),
    (r"^distrokid", "MUSIC/Distribution/DistroKid"),
    (r"^tunecore", "MUSIC/Distribution/TuneCore"),
    (r"^royalt", "MUSIC/Royalties"),
    (r"^copyright", "MUSIC/Copyright-Legal"),
    (r"^distribut", "MUSIC/Distribution"),
    // Projects
    (r"^project", "PROJECTS"),
    (r"^ssrn", "PROJECTS/SSRN-Academic"),
    (r"^academ", "PROJECTS/SSRN-Academic"),
    (r"^github", "PROJECTS/GitHub-Dev"),
    (r"^dev$", "PROJECTS/GitHub-Dev"),
    (r"^development", "PROJECTS/GitHub-Dev"),
    (r"^coding", "PROJECTS/GitHub-Dev"),
    (r"^code$", "PROJECTS/GitHub-Dev"),
    (r"^yumyum", "PROJECTS/YumYumCode"),
    (r"^tiki", "PROJECTS/Tiki-Washbot"),
    (r"^neurooz", "PROJECTS/Neurooz"),
    (r"^alt.?text", "PROJECTS/Alt-Text-ADA"),
    (r"^app.?idea", "PROJECTS/App-Ideas"),
    // Job search
    (r"^job", "JOB-SEARCH"),
    (r"^work$", "JOB-SEARCH"),
    (r"^career", "JOB-SEARCH"),
    (r"^employ", "JOB-SEARCH"),
    (r"^application", "JOB-SEARCH/Applications"),
    (r"^interview", "JOB-SEARCH/Interviews"),
    (r"^indeed", "JOB-SEARCH/Alerts/Indeed"),
    (r"^linkedin[/\\]job", "JOB-SEARCH/Alerts/LinkedIn"),
    (r"^job.?alert", "JOB-SEARCH/Alerts"),
    (r"^resume", "JOB-SEARCH/Applications"),
    // API / credentials
    (r"^api", "API-KEYS-CREDENTIALS/API-Keys"),
    (r"^key", "API-KEYS-CREDENTIALS/API-Keys"),
    (r"^token", "API-KEYS-CREDENTIALS/Bot-Tokens"),
    (r"^password", "API-KEYS-CREDENTIALS/Passwords"),
    (r"^credential", "API-KEYS-CREDENTIALS"),
    (r"^license", "API-KEYS-CREDENTIALS/Licenses"),
    // Contacts
    (r"^contact", "CONTACTS"),
    (r"^caresse", "CONTACTS/Caresse-Lopez"),
    (r"^church", "CONTACTS/Church-One20"),
    (r"^one20", "CONTACTS/Church-One20"),
    // Orders / receipts
    (r"^order", "ORDERS-RECEIPTS"),
    (r"^receipt", "ORDERS-RECEIPTS"),
    (r"^purchase", "ORDERS-RECEIPTS"),
    (r"^amazon", "ORDERS-RECEIPTS/Amazon"),
    (r"^ebay", "ORDERS-RECEIPTS/eBay"),
    (r"^etsy", "ORDERS-RECEIPTS/Etsy"),
    (r"^google.?play", "ORDERS-RECEIPTS/Google-Play"),
    (r"^subscript", "ORDERS-RECEIPTS/Subscriptions"),
    (r"^shopping", "ORDERS-RECEIPTS/Other-Purchases"),
    // Newsletters
    (r"^newsletter", "NEWSLETTERS"),
    (r"^digest", "NEWSLETTERS"),
    (r"^tech.?news", "NEWSLETTERS/Tech"),
    // Software
    (r"^software", "SOFTWARE-TRACKING"),
    (r"^trial", "SOFTWARE-TRACKING/Trials"),
    (r"^cancel", "SOFTWARE-TRACKING/Cancellations"),
    // Social media
    (r"^social", "SOCIAL-MEDIA"),
    (r"^tiktok", "SOCIAL-MEDIA/TikTok"),
    (r"^linkedin$", "SOCIAL-MEDIA/LinkedIn"),
    (r"^reddit", "SOCIAL-MEDIA/Reddit"),
    (r"^nextdoor", "SOCIAL-MEDIA/Nextdoor"),
    // Catch-all
    (r"^important$", SENTINEL_LABEL),
    (r"^review$", SENTINEL_LABEL),
    (r"^todo$", SENTINEL_LABEL),
    (r"^to.?do$", SENTINEL_LABEL),
    (r"^flag", SENTINEL_LABEL),
];

/// Source form of a categorization rule, as written in the built-in table or a taxonomy file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_pattern: Option<String>,
    #[serde(default)]
    pub has_unsubscribe: bool,
    pub labels: Vec<String>,
}

impl RuleDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            from_pattern: None,
            to_pattern: None,
            subject_pattern: None,
            has_unsubscribe: false,
            labels: Vec::new(),
        }
    }

    pub fn from(mut self, pattern: &str) -> Self {
        self.from_pattern = Some(pattern.to_string());
        self
    }

    pub fn to(mut self, pattern: &str) -> Self {
        self.to_pattern = Some(pattern.to_string());
        self
    }

    pub fn subject(mut self, pattern: &str) -> Self {
        self.subject_pattern = Some(pattern.to_string());
        self
    }

    pub fn unsubscribe(mut self) -> Self {
        self.has_unsubscribe = true;
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationDefinition {
    pub pattern: String,
    pub target: String,
}

/// Everything needed to compile a [`Taxonomy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyDefinition {
    pub hierarchy: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub migrations: Vec<MigrationDefinition>,
}

impl TaxonomyDefinition {
    pub fn builtin() -> Self {
        Self {
            hierarchy: LABEL_HIERARCHY.iter().map(|s| s.to_string()).collect(),
            rules: builtin_rules(),
            migrations: MIGRATION_MAP
                .iter()
                .map(|(pattern, target)| MigrationDefinition {
                    pattern: pattern.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        }
    }
}

fn builtin_rules() -> Vec<RuleDefinition> {
    let rule = RuleDefinition::new;
    vec![
        rule("Self-Emails")
            .from(r"angelreporters@gmail\.com")
            .to(r"angelreporters@gmail\.com")
            .labels(&["TIMELINE-EVIDENCE/Communications-Sent/Self-Emails"]),
        rule("API-Keys-Credentials")
            .from(r"angelreporters")
            .subject(r"(?i)(api|token|key)")
            .labels(&["API-KEYS-CREDENTIALS/API-Keys"]),
        rule("Sent-To-Contacts")
            .from(r"angelreporters@gmail\.com")
            .labels(&["TIMELINE-EVIDENCE/Communications-Sent/To-Contacts"]),
        rule("Caresse-Lopez")
            .from(r"lopez\.caresse@gmail\.com")
            .labels(&["CONTACTS/Caresse-Lopez", "MUSIC/Collaborations/Caresse-Rae-Edna"]),
        rule("Caresse-Lopez-To")
            .to(r"lopez\.caresse@gmail\.com")
            .labels(&["CONTACTS/Caresse-Lopez", "MUSIC/Collaborations/Caresse-Rae-Edna"]),
        rule("GitHub")
            .from(r"github\.com")
            .labels(&["PROJECTS/GitHub-Dev"]),
        rule("SSRN-From").from(r"ssrn").labels(&["PROJECTS/SSRN-Academic"]),
        rule("SSRN-Subject")
            .subject(r"(?i)ssrn")
            .labels(&["PROJECTS/SSRN-Academic"]),
        rule("Indeed-Jobs")
            .from(r"indeed")
            .subject(r"(?i)job")
            .labels(&["JOB-SEARCH/Alerts/Indeed"]),
        rule("LinkedIn-Jobs")
            .from(r"linkedin")
            .subject(r"(?i)job")
            .labels(&["JOB-SEARCH/Alerts/LinkedIn"]),
        rule("Amazon-Orders")
            .from(r"amazon")
            .subject(r"(?i)(order|shipment)")
            .labels(&["ORDERS-RECEIPTS/Amazon"]),
        rule("Google-Play")
            .from(r"google")
            .subject(r"(?i)(receipt|purchase)")
            .labels(&["ORDERS-RECEIPTS/Google-Play"]),
        rule("Chase-Banking")
            .from(r"chase")
            .labels(&["TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase"]),
        rule("Bank-General")
            .from(r"bank")
            .labels(&["TIMELINE-EVIDENCE/Financial-Transactions/Banking-Chase"]),
        rule("Robinhood")
            .from(r"robinhood")
            .labels(&["TIMELINE-EVIDENCE/Financial-Transactions/Robinhood-Investments"]),
        rule("UC-Health")
            .from(r"uchealth")
            .labels(&["TIMELINE-EVIDENCE/Medical/UC-Health"]),
        rule("IRS")
            .subject(r"(?i)\bIRS\b")
            .labels(&["TIMELINE-EVIDENCE/Government/IRS"]),
        rule("SSA")
            .subject(r"(?i)(SSA|Social\s+Security)")
            .labels(&["TIMELINE-EVIDENCE/Government/SSA"]),
        rule("Medicaid-Medicare")
            .subject(r"(?i)(medicaid|medicare)")
            .labels(&["TIMELINE-EVIDENCE/Government/Medicaid-Medicare"]),
        rule("Redfin")
            .from(r"redfin")
            .labels(&["TIMELINE-EVIDENCE/Location-Activity/Redfin-Property"]),
        rule("HQS-Inspections")
            .subject(r"(?i)(HQS|inspection)")
            .labels(&["TIMELINE-EVIDENCE/Housing/HQS-Inspections"]),
        rule("SoundCloud")
            .from(r"soundcloud")
            .labels(&["MUSIC/Platforms/SoundCloud"]),
        rule("Spotify")
            .from(r"spotify")
            .labels(&["MUSIC/Platforms/Spotify"]),
        rule("Church-One20")
            .from(r"(one20|dusty)")
            .labels(&["CONTACTS/Church-One20"]),
        rule("TikTok").from(r"tiktok").labels(&["SOCIAL-MEDIA/TikTok"]),
        rule("LinkedIn")
            .from(r"linkedin")
            .labels(&["SOCIAL-MEDIA/LinkedIn"]),
        rule("Reddit").from(r"reddit").labels(&["SOCIAL-MEDIA/Reddit"]),
        rule("Nextdoor")
            .from(r"nextdoor")
            .labels(&["SOCIAL-MEDIA/Nextdoor"]),
        rule("eBay").from(r"ebay").labels(&["ORDERS-RECEIPTS/eBay"]),
        rule("Etsy").from(r"etsy").labels(&["ORDERS-RECEIPTS/Etsy"]),
        rule("Legal-Court")
            .subject(r"(?i)(court|attorney|legal|subpoena)")
            .labels(&["TIMELINE-EVIDENCE/Legal-Court"]),
        rule("Newsletters").unsubscribe().labels(&["NEWSLETTERS"]),
    ]
}

/// A compiled categorization rule. Absent predicates do not constrain.
#[derive(Debug, Clone)]
pub struct CategorizationRule {
    pub name: String,
    pub from: Option<Regex>,
    pub to: Option<Regex>,
    pub subject: Option<Regex>,
    pub requires_unsubscribe: bool,
    pub labels: Vec<String>,
}

/// A compiled migration pattern and the hierarchy label it maps to
#[derive(Debug, Clone)]
pub struct MigrationRule {
    pub pattern: Regex,
    pub target: String,
}

impl MigrationRule {
    /// Leaf segment first, then the full path
    pub fn matches_label(&self, leaf: &str, full_path: &str) -> bool {
        self.pattern.is_match(leaf) || self.pattern.is_match(full_path)
    }
}

/// The immutable, validated label taxonomy for one run
#[derive(Debug, Clone)]
pub struct Taxonomy {
    hierarchy: Vec<String>,
    index: HashSet<String>,
    categorization_rules: Vec<CategorizationRule>,
    migration_rules: Vec<MigrationRule>,
}

impl Taxonomy {
    /// Compile the built-in tables
    pub fn builtin() -> Result<Self> {
        Self::compile(TaxonomyDefinition::builtin())
    }

    /// Load a taxonomy from a TOML file and compile it
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OrganizerError::ConfigError(format!("Failed to read taxonomy file {:?}: {}", path, e))
        })?;

        let definition: TaxonomyDefinition = toml::from_str(&content).map_err(|e| {
            OrganizerError::ConfigError(format!("Failed to parse taxonomy file {:?}: {}", path, e))
        })?;

        let taxonomy = Self::compile(definition)?;
        tracing::info!(
            "Loaded taxonomy from {:?}: {} labels, {} rules, {} migrations",
            path,
            taxonomy.hierarchy.len(),
            taxonomy.categorization_rules.len(),
            taxonomy.migration_rules.len()
        );
        Ok(taxonomy)
    }

    /// Validate and compile a definition. Any unknown label, orphaned path or
    /// bad pattern is an error here, before any remote call is made.
    pub fn compile(definition: TaxonomyDefinition) -> Result<Self> {
        validate_hierarchy(&definition.hierarchy)?;
        let index: HashSet<String> = definition.hierarchy.iter().cloned().collect();

        if !index.contains(SENTINEL_LABEL) {
            return Err(OrganizerError::RuleError(format!(
                "hierarchy must contain the review label '{}'",
                SENTINEL_LABEL
            )));
        }

        let categorization_rules = definition
            .rules
            .iter()
            .map(|rule| compile_rule(rule, &index))
            .collect::<Result<Vec<_>>>()?;

        let migration_rules = definition
            .migrations
            .iter()
            .map(|migration| compile_migration(migration, &index))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Compiled taxonomy: {} labels, {} rules, {} migrations",
            definition.hierarchy.len(),
            categorization_rules.len(),
            migration_rules.len()
        );

        Ok(Self {
            hierarchy: definition.hierarchy,
            index,
            categorization_rules,
            migration_rules,
        })
    }

    /// Canonical labels in declaration order (parents before children)
    pub fn hierarchy(&self) -> &[String] {
        &self.hierarchy
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// True when `name` is a hierarchy label or a path descendant of one
    pub fn covers(&self, name: &str) -> bool {
        if self.index.contains(name) {
            return true;
        }
        name.match_indices('/')
            .any(|(pos, _)| self.index.contains(&name[..pos]))
    }

    pub fn sentinel(&self) -> &str {
        SENTINEL_LABEL
    }

    pub fn categorization_rules(&self) -> &[CategorizationRule] {
        &self.categorization_rules
    }

    pub fn migration_rules(&self) -> &[MigrationRule] {
        &self.migration_rules
    }
}

/// True for names owned by the mailbox (INBOX, CATEGORY_SOCIAL, ...)
pub fn is_system_label_name(name: &str) -> bool {
    SYSTEM_LABEL_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Every path must be well-formed, unique and have its parent declared
pub fn validate_hierarchy(hierarchy: &[String]) -> Result<()> {
    if hierarchy.is_empty() {
        return Err(OrganizerError::RuleError(
            "label hierarchy cannot be empty".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(hierarchy.len());
    for path in hierarchy {
        if path.split('/').any(|segment| segment.trim().is_empty()) {
            return Err(OrganizerError::RuleError(format!(
                "hierarchy label '{}' has an empty path segment",
                path
            )));
        }
        if !seen.insert(path.as_str()) {
            return Err(OrganizerError::RuleError(format!(
                "hierarchy label '{}' is declared twice",
                path
            )));
        }
    }

    for path in hierarchy {
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !seen.contains(parent) {
                return Err(OrganizerError::RuleError(format!(
                    "hierarchy label '{}' has no parent '{}'",
                    path, parent
                )));
            }
        }
    }

    Ok(())
}

fn case_insensitive(pattern: &str, context: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| OrganizerError::RuleError(format!("{}: invalid pattern '{}': {}", context, pattern, e)))
}

fn compile_rule(rule: &RuleDefinition, index: &HashSet<String>) -> Result<CategorizationRule> {
    if rule.labels.is_empty() {
        return Err(OrganizerError::RuleError(format!(
            "rule '{}' has no labels",
            rule.name
        )));
    }
    if let Some(missing) = rule.labels.iter().find(|label| !index.contains(label.as_str())) {
        return Err(OrganizerError::RuleError(format!(
            "rule '{}' references unknown label '{}'",
            rule.name, missing
        )));
    }
    if rule.from_pattern.is_none()
        && rule.to_pattern.is_none()
        && rule.subject_pattern.is_none()
        && !rule.has_unsubscribe
    {
        return Err(OrganizerError::RuleError(format!(
            "rule '{}' has no predicates",
            rule.name
        )));
    }

    let context = format!("rule '{}'", rule.name);
    let from = rule
        .from_pattern
        .as_deref()
        .map(|p| case_insensitive(p, &context))
        .transpose()?;
    let to = rule
        .to_pattern
        .as_deref()
        .map(|p| case_insensitive(p, &context))
        .transpose()?;
    // Subject patterns carry their own (?i) flag where they want one
    let subject = rule
        .subject_pattern
        .as_deref()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                OrganizerError::RuleError(format!("{}: invalid pattern '{}': {}", context, p, e))
            })
        })
        .transpose()?;

    Ok(CategorizationRule {
        name: rule.name.clone(),
        from,
        to,
        subject,
        requires_unsubscribe: rule.has_unsubscribe,
        labels: rule.labels.clone(),
    })
}

fn compile_migration(migration: &MigrationDefinition, index: &HashSet<String>) -> Result<MigrationRule> {
    if !index.contains(migration.target.as_str()) {
        return Err(OrganizerError::RuleError(format!(
            "migration '{}' targets unknown label '{}'",
            migration.pattern, migration.target
        )));
    }

    Ok(MigrationRule {
        pattern: case_insensitive(&migration.pattern, "migration")?,
        target: migration.target.clone(),
    })
}
