//! geombatch-core: configuration-driven batch launcher for an external
//! CAD → h5m geometry conversion tool.
//!
//! Each configuration file is parsed into ordered `key=value` pairs, the tool
//! is run with matching `key:value` arguments, and on success the produced
//! mesh, journal and log files are archived together with the configuration
//! into a directory named after the first configuration value.

pub mod error;
pub mod launcher;
pub mod models;
pub mod parser;
pub mod storage;
pub mod tool;

pub use error::{LaunchError, Result};
pub use launcher::BatchLauncher;
pub use models::{
    ArchiveMetadata, BatchReport, ConfigEntry, GeomConfig, IterationReport, IterationStage,
    IterationStatus, LaunchSettings,
};
pub use parser::{load_config, parse_config_str};
pub use storage::ArtifactManifest;
pub use tool::{ToolCommand, ToolOutcome};
