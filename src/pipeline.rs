//! End-to-end orchestration of the fetch, forecast, and convert stages.
//!
//! Control flows strictly forward; the first failing stage stops the run.
//! Cleanup of intermediate files is independent of the outcome and runs
//! unless explicitly disabled.

use crate::assemble;
use crate::cli::Mode;
use crate::convert;
use crate::cycles::{self, ForecastCycle};
use crate::fetch::OpenDataClient;
use crate::forecast::{ForecastRunner, InputSource};
use crate::variables;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const SURFACE_FILE: &str = "ifs_sfc_latest.grib2";
const PRESSURE_FILE: &str = "ifs_pl_latest.grib2";
const ASSEMBLED_FILE: &str = "init.grib2";
const FORECAST_FILE: &str = "aurora.grib";
const NETCDF_FILE: &str = "aurora_forecast.nc";

/// Configuration threaded through the whole run. Cleanup suppression is an
/// explicit flag here, not a mutated method.
pub struct PipelineConfig {
    pub mode: Mode,
    pub lead_time: u32,
    pub output_dir: PathBuf,
    pub keep_intermediate: bool,
    pub model: String,
    pub forecast_command: Option<String>,
    pub endpoint: String,
    pub out_report: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    client: OpenDataClient,
    runner: ForecastRunner,
    sfc_file: PathBuf,
    pl_file: PathBuf,
    init_file: PathBuf,
    forecast_file: PathBuf,
    netcdf_file: PathBuf,
}

/// Machine-readable summary of one run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub mode: &'static str,
    pub lead_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<String>,
    pub stages: Vec<StageReport>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageReport {
    pub name: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("create output dir {}", config.output_dir.display()))?;
        let client = OpenDataClient::new(&config.endpoint);
        let runner = ForecastRunner::from_override(config.forecast_command.as_deref(), &config.model)?;
        let out = config.output_dir.clone();
        Ok(Self {
            client,
            runner,
            sfc_file: out.join(SURFACE_FILE),
            pl_file: out.join(PRESSURE_FILE),
            init_file: out.join(ASSEMBLED_FILE),
            forecast_file: out.join(FORECAST_FILE),
            netcdf_file: out.join(NETCDF_FILE),
            config,
        })
    }

    /// Execute the configured workflow. Returns `Err` if any stage failed;
    /// cleanup and report writing happen either way.
    pub fn run(&self) -> Result<()> {
        let mut report = RunReport {
            mode: self.config.mode.as_str(),
            lead_time: self.config.lead_time,
            cycle: None,
            stages: Vec::new(),
            success: false,
            output: None,
        };
        let result = match self.config.mode {
            Mode::Staged => self.run_staged(&mut report),
            Mode::Direct => self.run_direct(&mut report),
        };
        report.success = result.is_ok();
        if report.success {
            report.output = Some(self.netcdf_file.display().to_string());
        }

        if self.config.keep_intermediate {
            debug!("keeping intermediate files");
        } else {
            self.cleanup_intermediate_files();
        }

        if let Some(path) = &self.config.out_report {
            if let Err(err) = write_report(path, &report) {
                warn!("failed to write run report to {}: {err:#}", path.display());
            }
        }
        result
    }

    fn run_staged(&self, report: &mut RunReport) -> Result<()> {
        info!("starting staged open-data to Aurora workflow");
        let cycle = stage(report, "locate-cycle", || {
            cycles::locate_latest_cycle(Utc::now(), &self.client)
        })?;
        report.cycle = Some(cycle.to_string());
        stage(report, "fetch-surface", || {
            self.fetch(&cycle, &variables::SURFACE, &self.sfc_file)
        })?;
        stage(report, "fetch-pressure", || {
            self.fetch(&cycle, &variables::PRESSURE_LEVEL, &self.pl_file)
        })?;
        stage(report, "assemble-input", || {
            assemble::concatenate(&[&self.sfc_file, &self.pl_file], &self.init_file).map(drop)
        })?;
        stage(report, "run-forecast", || {
            self.runner.run(
                &InputSource::File(self.init_file.clone()),
                self.config.lead_time,
                &self.forecast_file,
            )
        })?;
        stage(report, "convert-output", || {
            convert::convert_to_netcdf(&self.forecast_file, &self.netcdf_file)
        })?;
        info!("workflow completed successfully");
        Ok(())
    }

    fn run_direct(&self, report: &mut RunReport) -> Result<()> {
        info!("starting direct workflow (forecast tool fetches its own input)");
        stage(report, "run-forecast", || {
            self.runner.run(
                &InputSource::OpenData,
                self.config.lead_time,
                &self.forecast_file,
            )
        })?;
        stage(report, "convert-output", || {
            convert::convert_to_netcdf(&self.forecast_file, &self.netcdf_file)
        })?;
        info!("workflow completed successfully");
        Ok(())
    }

    fn fetch(
        &self,
        cycle: &ForecastCycle,
        variables: &variables::VariableSet,
        target: &Path,
    ) -> Result<()> {
        self.client.retrieve(cycle, variables, 0, target).map(drop)
    }

    /// Remove intermediate GRIB files. Best effort: missing files are fine,
    /// other failures only warn, and the forecast outputs are untouched.
    pub fn cleanup_intermediate_files(&self) {
        info!("cleaning up intermediate files");
        for path in [&self.sfc_file, &self.pl_file, &self.init_file] {
            match fs::remove_file(path) {
                Ok(()) => debug!("removed {}", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove {}: {err}", path.display()),
            }
        }
    }
}

/// Run one stage, record its outcome, and propagate failure so later
/// stages never execute after the first failing one.
fn stage<T>(
    report: &mut RunReport,
    name: &'static str,
    run: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let result = run();
    match &result {
        Ok(_) => report.stages.push(StageReport {
            name,
            ok: true,
            error: None,
        }),
        Err(err) => {
            error!("stage {name} failed: {err:#}");
            report.stages.push(StageReport {
                name,
                ok: false,
                error: Some(format!("{err:#}")),
            });
        }
    }
    result.with_context(|| format!("stage {name}"))
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    info!("wrote run report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::fs;

    fn test_pipeline(dir: &Path) -> Pipeline {
        Pipeline::new(PipelineConfig {
            mode: Mode::Staged,
            lead_time: 72,
            output_dir: dir.to_path_buf(),
            keep_intermediate: false,
            model: "aurora".into(),
            forecast_command: Some("ai-models".into()),
            endpoint: "https://example.int/forecasts".into(),
            out_report: None,
        })
        .unwrap()
    }

    fn empty_report() -> RunReport {
        RunReport {
            mode: "staged",
            lead_time: 72,
            cycle: None,
            stages: Vec::new(),
            success: false,
            output: None,
        }
    }

    #[test]
    fn cleanup_removes_only_intermediates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = test_pipeline(dir.path());
        for name in [SURFACE_FILE, PRESSURE_FILE, ASSEMBLED_FILE, FORECAST_FILE] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        pipeline.cleanup_intermediate_files();
        assert!(!dir.path().join(SURFACE_FILE).exists());
        assert!(!dir.path().join(PRESSURE_FILE).exists());
        assert!(!dir.path().join(ASSEMBLED_FILE).exists());
        assert!(dir.path().join(FORECAST_FILE).exists());

        // Second pass over already-missing files must not fail.
        pipeline.cleanup_intermediate_files();
    }

    #[test]
    fn stage_records_success_and_failure() {
        let mut report = empty_report();
        let value = stage(&mut report, "first", || Ok::<_, anyhow::Error>(7)).unwrap();
        assert_eq!(value, 7);

        let err = stage(&mut report, "second", || {
            Err::<(), _>(anyhow!("provider unreachable"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("stage second"));

        assert_eq!(report.stages.len(), 2);
        assert!(report.stages[0].ok);
        assert!(!report.stages[1].ok);
        assert!(report.stages[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("provider unreachable")));
    }

    #[test]
    fn report_serializes_stage_outcomes() {
        let mut report = empty_report();
        let _ = stage(&mut report, "locate-cycle", || Ok::<_, anyhow::Error>(()));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"locate-cycle\""));
        assert!(json.contains("\"ok\":true"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn new_creates_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs/today");
        let _ = test_pipeline(&nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn report_is_written_where_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_report.json");
        let report = empty_report();
        write_report(&path, &report).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"mode\": \"staged\""));
    }
}
