//! Error types for geombatch-core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to read configuration {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line {line} in {}: expected key=value, got {content:?}", .path.display())]
    ConfigParse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Configuration {} contains no key=value pairs", .path.display())]
    EmptyConfig { path: PathBuf },

    #[error("Failed to start tool '{program}': {source}")]
    ToolInvocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool exited with status {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ToolFailure { code: Option<i32> },

    #[error("Invalid output directory name: {0:?}")]
    InvalidOutputName(String),

    #[error("Failed to create output directory {}: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {} -> {}: {source}", .from.display(), .to.display())]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
