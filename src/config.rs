use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{OrganizerError, Result};

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "GMAIL_ORGANIZER_";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Page size for label and message listings
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Maximum attempts per remote call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
    #[serde(default = "default_max_jitter_secs")]
    pub max_jitter_secs: f64,
    #[serde(default = "default_calls_per_second")]
    pub calls_per_second: f64,
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_jitter_secs: default_max_jitter_secs(),
            calls_per_second: default_calls_per_second(),
            burst_capacity: default_burst_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// 0 means no limit
    #[serde(default)]
    pub max_messages: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            max_messages: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_report_json")]
    pub report_json: PathBuf,
    #[serde(default = "default_report_markdown")]
    pub report_markdown: PathBuf,
    #[serde(default = "default_plan_file")]
    pub plan_file: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            report_json: default_report_json(),
            report_markdown: default_report_markdown(),
            plan_file: default_plan_file(),
            state_file: default_state_file(),
        }
    }
}

impl OutputConfig {
    /// Relative artifact paths resolve against `directory`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }

    pub fn report_json_path(&self) -> PathBuf {
        self.resolve(&self.report_json)
    }

    pub fn report_markdown_path(&self) -> PathBuf {
        self.resolve(&self.report_markdown)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.resolve(&self.plan_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaxonomyConfig {
    /// Replaces the built-in hierarchy and rule tables when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    7
}

fn default_base_delay_secs() -> f64 {
    1.0
}

fn default_max_jitter_secs() -> f64 {
    1.0
}

fn default_calls_per_second() -> f64 {
    10.0
}

fn default_burst_capacity() -> f64 {
    12.0
}

fn default_dry_run() -> bool {
    true
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_json() -> PathBuf {
    PathBuf::from("gmail_organizer_report.json")
}

fn default_report_markdown() -> PathBuf {
    PathBuf::from("gmail_organizer_report.md")
}

fn default_plan_file() -> PathBuf {
    PathBuf::from("migration_plan.json")
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".gmail-organizer/state.json")
}

/// Read `GMAIL_ORGANIZER_<name>` and parse it, if set
fn env_value<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match std::env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrganizerError::ConfigError(format!("Invalid {}='{}': {}", key, raw, e))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(OrganizerError::ConfigError(format!("Invalid {}: {}", key, e))),
    }
}

/// Longest configurable retry delay, in seconds
const MAX_DELAY_SECS: f64 = 3600.0;

fn check_delay(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(OrganizerError::ConfigError(format!(
            "{} must be a non-negative number of seconds",
            name
        )));
    }
    if value > MAX_DELAY_SECS {
        return Err(OrganizerError::ConfigError(format!(
            "{} cannot exceed {} seconds",
            name, MAX_DELAY_SECS
        )));
    }
    Ok(())
}

impl Config {
    /// Load the file (defaults if missing), apply environment overrides, validate
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                OrganizerError::ConfigError(format!("Failed to read config file: {}", e))
            })?;

            let config: Self = toml::from_str(&content).map_err(|e| {
                OrganizerError::ConfigError(format!("Failed to parse config file: {}", e))
            })?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    OrganizerError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            OrganizerError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| OrganizerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_value("BATCH_SIZE")? {
            self.api.batch_size = v;
        }
        if let Some(v) = env_value("MAX_RETRIES")? {
            self.api.max_retries = v;
        }
        if let Some(v) = env_value("BASE_DELAY_SECS")? {
            self.api.base_delay_secs = v;
        }
        if let Some(v) = env_value("MAX_JITTER_SECS")? {
            self.api.max_jitter_secs = v;
        }
        if let Some(v) = env_value("CALLS_PER_SECOND")? {
            self.api.calls_per_second = v;
        }
        if let Some(v) = env_value("BURST_CAPACITY")? {
            self.api.burst_capacity = v;
        }
        if let Some(v) = env_value("DRY_RUN")? {
            self.execution.dry_run = v;
        }
        if let Some(v) = env_value("MAX_MESSAGES")? {
            self.execution.max_messages = v;
        }
        if let Some(v) = env_value::<PathBuf>("OUTPUT_DIR")? {
            self.output.directory = v;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.batch_size == 0 {
            return Err(OrganizerError::ConfigError(
                "api.batch_size must be at least 1".to_string(),
            ));
        }
        if self.api.batch_size > 500 {
            return Err(OrganizerError::ConfigError(
                "api.batch_size cannot exceed 500 (Gmail list page limit)".to_string(),
            ));
        }

        if self.api.max_retries == 0 {
            return Err(OrganizerError::ConfigError(
                "api.max_retries must be at least 1".to_string(),
            ));
        }

        check_delay("api.base_delay_secs", self.api.base_delay_secs)?;
        check_delay("api.max_jitter_secs", self.api.max_jitter_secs)?;

        if !self.api.calls_per_second.is_finite() || self.api.calls_per_second <= 0.0 {
            return Err(OrganizerError::ConfigError(
                "api.calls_per_second must be greater than 0".to_string(),
            ));
        }

        if !self.api.burst_capacity.is_finite() || self.api.burst_capacity < 1.0 {
            return Err(OrganizerError::ConfigError(
                "api.burst_capacity must be at least 1".to_string(),
            ));
        }

        if self.output.directory.as_os_str().is_empty() {
            return Err(OrganizerError::ConfigError(
                "output.directory cannot be empty".to_string(),
            ));
        }

        for (name, path) in [
            ("output.report_json", &self.output.report_json),
            ("output.report_markdown", &self.output.report_markdown),
            ("output.plan_file", &self.output.plan_file),
            ("output.state_file", &self.output.state_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(OrganizerError::ConfigError(format!("{} cannot be empty", name)));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
