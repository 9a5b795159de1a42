//! Batch launcher: the parse → clean → invoke → archive loop.
//!
//! Configuration files are processed strictly one after another. The working
//! directory is shared between iterations: artifacts left behind by a failed
//! tool run stay there until the clean step of the next iteration.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{LaunchError, Result};
use crate::models::{
    ArchiveMetadata, BatchReport, GeomConfig, IterationReport, IterationStage, IterationStatus,
    LaunchSettings,
};
use crate::parser;
use crate::storage::{self, ArtifactManifest, ArtifactSnapshot};
use crate::tool::ToolCommand;

pub struct BatchLauncher {
    settings: LaunchSettings,
    tool: ToolCommand,
    manifest: ArtifactManifest,
}

impl BatchLauncher {
    pub fn new(settings: LaunchSettings) -> Result<Self> {
        settings.validate()?;
        let tool = ToolCommand::from_parts(&settings.tool)?;
        let manifest = ArtifactManifest::new(settings.artifact_extensions.iter().cloned());
        Ok(Self {
            settings,
            tool,
            manifest,
        })
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Process every configuration file in order.
    ///
    /// Iteration failures are recorded in the report and the batch moves on.
    /// An unreadable configuration file stops the batch; the report then
    /// carries the reason in `aborted` and lists what was done before it.
    pub async fn run<P: AsRef<Path>>(&self, configs: &[P]) -> Result<BatchReport> {
        let started_at = Utc::now();
        info!(
            configs = configs.len(),
            working_dir = %self.settings.working_dir.display(),
            "Starting batch"
        );

        let mut iterations = Vec::with_capacity(configs.len());
        let mut aborted = None;
        for path in configs {
            match self.run_one(path.as_ref()).await {
                Ok(report) => iterations.push(report),
                Err(e) => {
                    let mut report = IterationReport::pending(path.as_ref());
                    report.error = Some(e.to_string());
                    iterations.push(report);
                    aborted = Some(e.to_string());
                    break;
                }
            }
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            iterations,
            aborted,
        };
        info!(
            archived = report.archived(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Run a single iteration. Returns `Err` only for launcher-level errors.
    pub async fn run_one(&self, path: &Path) -> Result<IterationReport> {
        let mut report = IterationReport::pending(path);
        let start = std::time::Instant::now();

        let outcome = self.iterate(path, &mut report).await;
        report.duration_secs = start.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                report.status = IterationStatus::Archived;
                info!(
                    config = %path.display(),
                    output = %report.output_dir.as_deref().unwrap_or(Path::new("")).display(),
                    artifacts = report.artifacts.len(),
                    "Archived"
                );
            }
            Err(e @ LaunchError::ConfigRead { .. }) => {
                error!(config = %path.display(), "{}", e);
                return Err(e);
            }
            Err(e @ LaunchError::ToolFailure { .. }) => {
                warn!(config = %path.display(), "{}; skipping", e);
                report.status = IterationStatus::SkippedOnFailure;
                report.error = Some(e.to_string());
            }
            Err(e) => {
                error!(config = %path.display(), stage = %report.stage, "{}", e);
                report.status = IterationStatus::Failed;
                report.error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    async fn iterate(&self, path: &Path, report: &mut IterationReport) -> Result<()> {
        let working_dir = &self.settings.working_dir;

        let config = parser::load_config(path)?;
        report.tokens = config.tokens();
        report.stage = IterationStage::Parsed;

        // The configuration itself may live in the working directory with an
        // artifact extension; it is never cleaned or archived as an artifact.
        let keep: Vec<PathBuf> = std::fs::canonicalize(&config.source).into_iter().collect();

        if self.settings.clean_before_run {
            let removed = storage::clean_artifacts(working_dir, &self.manifest, &keep)?;
            if !removed.is_empty() {
                info!(count = removed.len(), "Removed stale artifacts");
            }
        }
        report.stage = IterationStage::Cleaned;

        let before = ArtifactSnapshot::scan(working_dir, &self.manifest)?;
        let outcome = self.tool.invoke(working_dir, &report.tokens).await?;
        report.exit_code = outcome.exit_code;
        report.stage = IterationStage::Invoked;
        outcome.check()?;
        let mut produced =
            ArtifactSnapshot::scan(working_dir, &self.manifest)?.produced_since(&before);
        produced.retain(|p| !storage::is_same_file_as_any(p, &keep));

        self.archive(&config, produced, report)?;
        report.stage = IterationStage::Archived;
        Ok(())
    }

    fn archive(
        &self,
        config: &GeomConfig,
        produced: Vec<PathBuf>,
        report: &mut IterationReport,
    ) -> Result<()> {
        let name = config.output_name().unwrap_or_default();
        let out_dir = storage::create_output_dir(&self.settings.working_dir, name)?;
        report.output_dir = Some(out_dir.clone());

        // Recorded one by one so a partial archive shows up in the report.
        for file in produced {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            let dest = out_dir.join(file_name);
            storage::move_file(&file, &dest)?;
            report.artifacts.push(dest);
        }

        let config_dest = out_dir.join(&self.settings.config_file_name);
        storage::move_file(&config.source, &config_dest)?;

        if self.settings.write_metadata {
            let finished_at = Utc::now();
            let meta = ArchiveMetadata {
                name: name.to_string(),
                config_source: config.source.clone(),
                tokens: report.tokens.clone(),
                exit_code: report.exit_code,
                artifacts: report
                    .artifacts
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .collect(),
                started_at: report.started_at,
                finished_at,
                duration_secs: (finished_at - report.started_at).num_milliseconds() as f64
                    / 1000.0,
            };
            storage::save_archive_metadata(&out_dir, &meta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_settings() {
        let settings = LaunchSettings::default().with_tool(Vec::<String>::new());
        assert!(BatchLauncher::new(settings).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let launcher = BatchLauncher::new(
            LaunchSettings::default().with_working_dir(tmp.path()),
        )
        .unwrap();
        let report = launcher.run::<PathBuf>(&[]).await.unwrap();
        assert!(report.iterations.is_empty());
        assert!(report.all_archived());
    }

    #[tokio::test]
    async fn test_parse_error_fails_iteration_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = tmp.path().join("bad.conf");
        std::fs::write(&cfg, "no equals sign here\n").unwrap();
        let launcher = BatchLauncher::new(
            LaunchSettings::default()
                .with_working_dir(tmp.path())
                .with_tool(["geombatch-no-such-tool-xyz"]),
        )
        .unwrap();

        let report = launcher.run(&[&cfg]).await.unwrap();
        let it = &report.iterations[0];
        assert_eq!(it.status, IterationStatus::Failed);
        assert_eq!(it.stage, IterationStage::Pending);
        assert!(it.error.as_deref().unwrap().contains("Malformed line 1"));
        assert!(cfg.exists());
    }

    #[tokio::test]
    async fn test_missing_tool_fails_iteration() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = tmp.path().join("a.conf");
        std::fs::write(&cfg, "name=demo\n").unwrap();
        let launcher = BatchLauncher::new(
            LaunchSettings::default()
                .with_working_dir(tmp.path())
                .with_tool(["geombatch-no-such-tool-xyz"]),
        )
        .unwrap();

        let report = launcher.run(&[&cfg]).await.unwrap();
        let it = &report.iterations[0];
        assert_eq!(it.status, IterationStatus::Failed);
        assert_eq!(it.stage, IterationStage::Cleaned);
        assert!(!tmp.path().join("demo").exists());
    }

    #[tokio::test]
    async fn test_unreadable_config_aborts_batch_with_partial_report() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bad = tmp.path().join("bad.conf");
        std::fs::write(&bad, "not a pair\n").unwrap();
        let missing = tmp.path().join("missing.conf");
        let later = tmp.path().join("later.conf");
        std::fs::write(&later, "name=later\n").unwrap();
        let launcher = BatchLauncher::new(
            LaunchSettings::default()
                .with_working_dir(tmp.path())
                .with_tool(["geombatch-no-such-tool-xyz"]),
        )
        .unwrap();

        let report = launcher.run(&[&bad, &missing, &later]).await.unwrap();
        assert_eq!(report.iterations.len(), 2, "batch stops at the unreadable file");
        assert_eq!(report.iterations[0].config, bad);
        assert_eq!(report.iterations[1].config, missing);
        assert_eq!(report.iterations[1].status, IterationStatus::Failed);
        assert!(report
            .aborted
            .as_deref()
            .unwrap()
            .contains("Failed to read configuration"));
        assert!(!report.all_archived());

        let err = launcher.run_one(&missing).await.unwrap_err();
        assert!(matches!(err, LaunchError::ConfigRead { .. }));
    }
}
