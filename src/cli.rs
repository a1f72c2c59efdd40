//! Command-line interface for the automation pipeline.
//!
//! The CLI is intentionally thin: it collects configuration and hands it to
//! the workflow without embedding any pipeline policy of its own.

use crate::fetch::DEFAULT_ENDPOINT;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which workflow configuration to run.
///
/// `staged` performs explicit cycle detection, download, and assembly
/// before handing the prepared input to the forecast tool. `direct` lets
/// the forecast tool download its own initial conditions and skips straight
/// to execution.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Staged,
    Direct,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Staged => "staged",
            Mode::Direct => "direct",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "aurora-pipeline",
    version,
    about = "ECMWF open-data to Aurora forecast automation",
    after_help = "Examples:\n  aurora-pipeline\n  aurora-pipeline --lead-time 120 --output-dir /scratch/aurora\n  aurora-pipeline --mode direct --keep-intermediate\n  aurora-pipeline --forecast-command 'conda run -n forecast ai-models'"
)]
pub struct RootArgs {
    /// Forecast lead time in hours
    #[arg(long, value_name = "HOURS", default_value_t = 72)]
    pub lead_time: u32,

    /// Output directory for all files
    #[arg(long, value_name = "DIR", default_value = "./data")]
    pub output_dir: PathBuf,

    /// Keep intermediate GRIB files
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Workflow configuration
    #[arg(long, value_enum, default_value_t = Mode::Staged)]
    pub mode: Mode,

    /// Model name passed to the forecast executable
    #[arg(long, value_name = "NAME", default_value = "aurora")]
    pub model: String,

    /// Override the forecast command line (also AURORA_FORECAST_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub forecast_command: Option<String>,

    /// Base URL of the ECMWF open-data service
    #[arg(long, value_name = "URL", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Write a machine-readable JSON run report
    #[arg(long, value_name = "PATH")]
    pub out_report: Option<PathBuf>,

    /// Default the log level to debug (RUST_LOG still takes precedence)
    #[arg(long)]
    pub verbose: bool,
}
