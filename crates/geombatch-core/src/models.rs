//! Data models for geombatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LaunchError, Result};
use crate::storage;

/// Name the configuration file is given inside an output directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "geom_config";

/// A single `key=value` pair from a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The `key:value` argument handed to the conversion tool.
    pub fn token(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

/// A parsed configuration file: entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeomConfig {
    pub source: PathBuf,
    pub entries: Vec<ConfigEntry>,
}

impl GeomConfig {
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn values(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.value.as_str()).collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.entries.iter().map(ConfigEntry::token).collect()
    }

    /// Value of the first entry; names the output directory.
    pub fn output_name(&self) -> Option<&str> {
        self.entries.first().map(|e| e.value.as_str())
    }
}

/// Settings for the batch launcher itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Tool command line: program followed by its leading arguments.
    pub tool: Vec<String>,
    /// Directory the tool runs in and where output directories are created.
    pub working_dir: PathBuf,
    /// Extensions (without the dot) identifying tool artifacts.
    pub artifact_extensions: Vec<String>,
    /// File name the configuration is archived under.
    pub config_file_name: String,
    /// Remove stale artifacts from the working directory before each run.
    pub clean_before_run: bool,
    /// Write `launch.yaml` into each output directory.
    pub write_metadata: bool,
    /// Configuration files to process when none are given on the command line.
    pub configs: Vec<PathBuf>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            tool: vec!["python3".to_string(), "step_to_h5m.py".to_string()],
            working_dir: PathBuf::from("."),
            artifact_extensions: vec!["h5m".to_string(), "jou".to_string(), "log".to_string()],
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            clean_before_run: true,
            write_metadata: false,
            configs: vec![],
        }
    }
}

impl LaunchSettings {
    /// Load settings from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| LaunchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_tool<I, S>(mut self, tool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool = tool.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_artifact_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifact_extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn with_config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool.first().map_or(true, |p| p.is_empty()) {
            return Err(LaunchError::InvalidSettings(
                "tool command must name a program".to_string(),
            ));
        }
        if self.artifact_extensions.iter().any(|e| e.is_empty()) {
            return Err(LaunchError::InvalidSettings(
                "artifact extensions must not be empty".to_string(),
            ));
        }
        storage::validate_file_name(&self.config_file_name)
            .map_err(|_| LaunchError::InvalidSettings(format!(
                "config_file_name {:?} is not a plain file name",
                self.config_file_name
            )))
    }
}

/// Furthest state an iteration reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IterationStage {
    Pending,
    Parsed,
    Cleaned,
    Invoked,
    Archived,
}

impl std::fmt::Display for IterationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationStage::Pending => write!(f, "pending"),
            IterationStage::Parsed => write!(f, "parsed"),
            IterationStage::Cleaned => write!(f, "cleaned"),
            IterationStage::Invoked => write!(f, "invoked"),
            IterationStage::Archived => write!(f, "archived"),
        }
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IterationStatus {
    Archived,
    SkippedOnFailure,
    Failed,
}

impl std::fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationStatus::Archived => write!(f, "ARCHIVED"),
            IterationStatus::SkippedOnFailure => write!(f, "SKIPPED"),
            IterationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of processing a single configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationReport {
    pub config: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub status: IterationStatus,
    pub stage: IterationStage,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Artifacts moved into the output directory.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl IterationReport {
    pub(crate) fn pending(config: &Path) -> Self {
        Self {
            config: config.to_path_buf(),
            output_dir: None,
            status: IterationStatus::Failed,
            stage: IterationStage::Pending,
            exit_code: None,
            tokens: vec![],
            artifacts: vec![],
            error: None,
            started_at: Utc::now(),
            duration_secs: 0.0,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == IterationStatus::Archived
    }
}

/// Per-configuration results of a whole batch, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: Vec<IterationReport>,
    /// Why the batch stopped early, if it did.
    #[serde(default)]
    pub aborted: Option<String>,
}

impl BatchReport {
    fn count(&self, status: IterationStatus) -> usize {
        self.iterations.iter().filter(|i| i.status == status).count()
    }

    pub fn archived(&self) -> usize {
        self.count(IterationStatus::Archived)
    }

    pub fn skipped(&self) -> usize {
        self.count(IterationStatus::SkippedOnFailure)
    }

    pub fn failed(&self) -> usize {
        self.count(IterationStatus::Failed)
    }

    pub fn all_archived(&self) -> bool {
        self.aborted.is_none() && self.iterations.iter().all(IterationReport::is_archived)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Metadata stored as `launch.yaml` inside an output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub name: String,
    pub config_source: PathBuf,
    pub tokens: Vec<String>,
    pub exit_code: Option<i32>,
    pub artifacts: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}
