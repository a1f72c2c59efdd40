//! ECMWF open-data to Aurora forecast automation.
//!
//! Locates the latest published IFS cycle, downloads its initial
//! conditions, runs the external forecast tool, and converts the output to
//! NetCDF. Exits 0 only when every invoked stage succeeds.

use anyhow::Result;
use clap::Parser;

mod assemble;
mod cli;
mod convert;
mod cycles;
mod fetch;
mod forecast;
mod pipeline;
mod variables;

use cli::RootArgs;
use pipeline::{Pipeline, PipelineConfig};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let pipeline = Pipeline::new(PipelineConfig {
        mode: args.mode,
        lead_time: args.lead_time,
        output_dir: args.output_dir,
        keep_intermediate: args.keep_intermediate,
        model: args.model,
        forecast_command: args.forecast_command,
        endpoint: args.endpoint,
        out_report: args.out_report,
    })?;
    pipeline.run()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}
