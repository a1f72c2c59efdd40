//! Invocation of the external forecast executable.
//!
//! The tool (`ai-models` by default) handles model weights, GPU placement,
//! and optionally its own data download; this module only builds the
//! command line, spawns it synchronously, and reads the exit status.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

/// Default forecast command when neither the flag nor the environment
/// overrides it.
pub const DEFAULT_COMMAND: &str = "ai-models";

const COMMAND_ENV: &str = "AURORA_FORECAST_COMMAND";

/// Where the forecast tool reads its initial conditions from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// The tool downloads ECMWF open data itself.
    OpenData,
    /// A prepared GRIB file on disk.
    File(PathBuf),
}

pub struct ForecastRunner {
    command: Vec<String>,
    model: String,
}

impl ForecastRunner {
    /// Resolve the forecast command: explicit override, then the
    /// `AURORA_FORECAST_COMMAND` environment variable, then the default.
    pub fn from_override(explicit: Option<&str>, model: &str) -> Result<Self> {
        let raw = explicit
            .map(str::to_string)
            .or_else(|| std::env::var(COMMAND_ENV).ok())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string());
        Self::from_command(&raw, model)
    }

    fn from_command(raw: &str, model: &str) -> Result<Self> {
        let command =
            shell_words::split(raw).with_context(|| format!("parse forecast command `{raw}`"))?;
        if command.is_empty() {
            bail!("forecast command is empty");
        }
        Ok(Self {
            command,
            model: model.to_string(),
        })
    }

    /// Run the forecast synchronously. Success is decided solely by the
    /// exit status; stdout/stderr are captured and logged.
    pub fn run(&self, input: &InputSource, lead_time: u32, output_path: &Path) -> Result<()> {
        let program = which::which(&self.command[0]).with_context(|| {
            format!("forecast executable `{}` not found in PATH", self.command[0])
        })?;
        info!(
            "running {} forecast with {lead_time}h lead time",
            self.model
        );

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);
        cmd.args(self.forecast_args(input, lead_time, output_path));
        let captured = cmd.output().context("spawn forecast command")?;

        let stdout = String::from_utf8_lossy(&captured.stdout);
        let stderr = String::from_utf8_lossy(&captured.stderr);
        if !captured.status.success() {
            bail!(
                "forecast command exited with {}: {}",
                exit_status_label(&captured.status),
                stderr.trim()
            );
        }
        if !stdout.trim().is_empty() {
            debug!("forecast stdout: {}", stdout.trim());
        }
        info!("forecast completed, output at {}", output_path.display());
        Ok(())
    }

    fn forecast_args(&self, input: &InputSource, lead_time: u32, output_path: &Path) -> Vec<String> {
        let mut args = vec![self.model.clone()];
        match input {
            InputSource::OpenData => {
                args.extend(["--input".into(), "ecmwf-open-data".into()]);
            }
            InputSource::File(path) => {
                args.extend([
                    "--input".into(),
                    "file".into(),
                    "--file".into(),
                    path.display().to_string(),
                ]);
            }
        }
        args.extend([
            "--lead-time".into(),
            lead_time.to_string(),
            "--output".into(),
            "file".into(),
            "--path".into(),
            output_path.display().to_string(),
        ]);
        args
    }
}

fn exit_status_label(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}
