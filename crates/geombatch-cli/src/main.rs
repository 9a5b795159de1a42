//! geombatch CLI: run the geometry conversion tool over a batch of
//! configuration files and archive the results.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing_subscriber::EnvFilter;

use geombatch_core::models::DEFAULT_CONFIG_FILE_NAME;
use geombatch_core::storage;
use geombatch_core::{load_config, BatchLauncher, BatchReport, LaunchSettings};

#[derive(Parser)]
#[command(
    name = "geombatch",
    about = "Batch launcher for configuration-driven CAD to h5m conversion",
    version,
    author
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversion tool for each configuration file, in order
    Run {
        /// Configuration files (key=value per line)
        configs: Vec<PathBuf>,
        /// YAML settings file
        #[arg(long, short)]
        settings: Option<PathBuf>,
        /// Tool program (replaces the configured tool command)
        #[arg(long)]
        tool: Option<String>,
        /// Leading argument for the tool program (repeatable)
        #[arg(long = "tool-arg", allow_hyphen_values = true)]
        tool_args: Vec<String>,
        /// Working directory for the tool and output directories
        #[arg(long, short = 'C')]
        workdir: Option<PathBuf>,
        /// Artifact extension (repeatable, replaces the default h5m/jou/log)
        #[arg(long = "ext")]
        extensions: Vec<String>,
        /// Name the configuration file is archived under
        #[arg(long)]
        config_name: Option<String>,
        /// Do not remove stale artifacts before each run
        #[arg(long)]
        no_clean: bool,
        /// Write launch.yaml into each output directory
        #[arg(long)]
        metadata: bool,
        /// Write the batch report to this file (.json for JSON, YAML otherwise)
        #[arg(long)]
        report: Option<PathBuf>,
        /// Exit non-zero if any configuration was not archived
        #[arg(long)]
        strict: bool,
    },
    /// Parse a configuration file and show the tool arguments (nothing is run)
    Parse {
        /// Configuration file
        config: PathBuf,
    },
    /// Inspect an output directory produced by `run`
    Inspect {
        /// Path to the output directory
        dir: PathBuf,
        /// Name of the archived configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE_NAME)]
        config_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Run {
            configs,
            settings,
            tool,
            tool_args,
            workdir,
            extensions,
            config_name,
            no_clean,
            metadata,
            report,
            strict,
        } => {
            let mut s = match settings {
                Some(path) => LaunchSettings::load(&path)
                    .with_context(|| format!("loading settings from {}", path.display()))?,
                None => LaunchSettings::default(),
            };
            if let Some(program) = tool {
                s = s.with_tool(std::iter::once(program).chain(tool_args));
            } else if !tool_args.is_empty() {
                anyhow::bail!("--tool-arg requires --tool");
            }
            if let Some(dir) = workdir {
                s = s.with_working_dir(dir);
            }
            if !extensions.is_empty() {
                s = s.with_artifact_extensions(extensions);
            }
            if let Some(name) = config_name {
                s = s.with_config_file_name(name);
            }
            if no_clean {
                s.clean_before_run = false;
            }
            if metadata {
                s.write_metadata = true;
            }
            cmd_run(s, configs, report, strict).await?;
        }
        Commands::Parse { config } => {
            cmd_parse(&config)?;
        }
        Commands::Inspect { dir, config_name } => {
            cmd_inspect(&dir, &config_name)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_run(
    settings: LaunchSettings,
    mut configs: Vec<PathBuf>,
    report_path: Option<PathBuf>,
    strict: bool,
) -> Result<()> {
    if configs.is_empty() {
        configs = settings.configs.clone();
    }
    if configs.is_empty() {
        anyhow::bail!("No configuration files given (pass them as arguments or list them under `configs` in the settings file)");
    }

    let launcher = BatchLauncher::new(settings)?;
    let report = launcher.run(&configs).await?;

    print_report(&report);

    if let Some(path) = report_path {
        storage::save_report(&path, &report)
            .with_context(|| format!("writing report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if let Some(reason) = &report.aborted {
        anyhow::bail!("Batch aborted: {}", reason);
    }

    if strict && !report.all_archived() {
        anyhow::bail!(
            "{} of {} configuration(s) were not archived",
            report.iterations.len() - report.archived(),
            report.iterations.len()
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Config", "Status", "Exit", "Output", "Artifacts", "Duration", "Error"]);

    for it in &report.iterations {
        let exit = it
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let output = it
            .output_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row([
            it.config.display().to_string(),
            it.status.to_string(),
            exit,
            output,
            it.artifacts.len().to_string(),
            format_duration(it.duration_secs),
            it.error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{}", table);
    println!(
        "{} archived, {} skipped, {} failed in {}",
        report.archived(),
        report.skipped(),
        report.failed(),
        format_duration(report.duration_secs())
    );
}

fn cmd_parse(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["#", "Key", "Value"]);
    for (i, entry) in config.entries.iter().enumerate() {
        table.add_row([(i + 1).to_string(), entry.key.clone(), entry.value.clone()]);
    }

    println!("Config: {}", path.display());
    println!("Output directory: {}", config.output_name().unwrap_or("-"));
    println!("{}", table);
    println!("── Tool arguments ──────────────────────");
    for token in config.tokens() {
        println!("{}", token);
    }
    Ok(())
}

fn cmd_inspect(dir: &Path, config_name: &str) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Output directory not found: {}", dir.display());
    }

    println!("Output: {}", dir.display());
    if let Some(meta) = storage::load_archive_metadata(dir)? {
        println!("Config source: {}", meta.config_source.display());
        println!("Started: {}", meta.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Duration: {}", format_duration(meta.duration_secs));
        if let Some(code) = meta.exit_code {
            println!("Exit code: {}", code);
        }
    }
    println!();

    let config_path = dir.join(config_name);
    if config_path.exists() {
        println!("── Config ──────────────────────────────");
        let content = std::fs::read_to_string(&config_path)?;
        println!("{}", content.trim());
        println!();
    }

    let files = storage::list_archive(dir)?;
    println!("── Files ({}) ──────────────────────────", files.len());
    for f in &files {
        println!("  {} ({} bytes)", f.name, f.size);
    }

    Ok(())
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        return format!("{}ms", (secs * 1000.0) as u64);
    }
    let secs = secs as u64;
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
