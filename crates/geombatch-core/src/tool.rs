//! External conversion tool invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{LaunchError, Result};

/// Program plus leading arguments, e.g. `python3 step_to_h5m.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Exit information of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_ms: u64,
}

impl ToolOutcome {
    /// `Ok` on success, `ToolFailure` otherwise.
    pub fn check(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(LaunchError::ToolFailure {
                code: self.exit_code,
            })
        }
    }
}

impl ToolCommand {
    pub fn from_parts(parts: &[String]) -> Result<Self> {
        match parts.split_first() {
            Some((program, args)) if !program.is_empty() => Ok(Self {
                program: program.clone(),
                args: args.to_vec(),
            }),
            _ => Err(LaunchError::InvalidSettings(
                "tool command must name a program".to_string(),
            )),
        }
    }

    /// Run `<program> <args...> <tokens...>` in `working_dir` and wait for it
    /// to exit. Output streams are inherited so the tool's progress stays
    /// visible.
    pub async fn invoke(&self, working_dir: &Path, tokens: &[String]) -> Result<ToolOutcome> {
        let start = Instant::now();
        info!(program = %self.program, args = tokens.len(), "Invoking conversion tool");
        debug!(?tokens, "Tool arguments");

        let status = Command::new(&self.program)
            .args(&self.args)
            .args(tokens)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| LaunchError::ToolInvocation {
                program: self.program.clone(),
                source,
            })?;

        let outcome = ToolOutcome {
            exit_code: status.code(),
            success: status.success(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(exit_code = ?outcome.exit_code, duration_ms = outcome.duration_ms, "Tool finished");
        Ok(outcome)
    }
}
