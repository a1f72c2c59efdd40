//! HTTP client for the ECMWF Open Data dissemination service.
//!
//! The service publishes each cycle as one GRIB2 file per forecast step,
//! with a `.index` sidecar listing every contained message as a JSON line
//! with its byte extent. Retrieval reads the index, selects the requested
//! parameters, and pulls the matching messages with byte-range requests,
//! the same protocol the upstream `ecmwf-opendata` client speaks.

use crate::cycles::{Availability, CycleProbe, ForecastCycle};
use crate::variables::VariableSet;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Public base URL for IFS open data.
pub const DEFAULT_ENDPOINT: &str = "https://data.ecmwf.int/forecasts";

/// Operational high-resolution stream.
const STREAM: &str = "oper";

/// Grid resolution segment of the published layout.
const RESOLUTION: &str = "0p25";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenDataClient {
    endpoint: String,
    agent: ureq::Agent,
}

/// One line of a `.index` sidecar. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct IndexEntry {
    param: String,
    #[serde(default)]
    levtype: Option<String>,
    #[serde(default)]
    levelist: Option<String>,
    #[serde(rename = "_offset")]
    offset: u64,
    #[serde(rename = "_length")]
    length: u64,
}

impl OpenDataClient {
    pub fn new(endpoint: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Download one variable group for `cycle` at forecast `step` into
    /// `target`, returning the number of bytes written.
    pub fn retrieve(
        &self,
        cycle: &ForecastCycle,
        variables: &VariableSet,
        step: u32,
        target: &Path,
    ) -> Result<u64> {
        info!(
            "downloading {} data for {cycle} to {}",
            variables.name,
            target.display()
        );
        let index_url = self.file_url(cycle, step, "index");
        let index = self
            .fetch_index(&index_url)
            .with_context(|| format!("fetch index {index_url}"))?;
        let entries = select_entries(&index, variables)?;
        if entries.is_empty() {
            bail!("index at {index_url} lists no {} messages", variables.name);
        }

        let data_url = self.file_url(cycle, step, "grib2");
        let mut out =
            File::create(target).with_context(|| format!("create {}", target.display()))?;
        let mut written = 0u64;
        for entry in &entries {
            written += self
                .fetch_range(&data_url, entry, &mut out)
                .with_context(|| format!("fetch {} message {}", variables.name, entry.param))?;
        }
        debug!(
            "wrote {written} bytes across {} messages to {}",
            entries.len(),
            target.display()
        );
        Ok(written)
    }

    fn fetch_index(&self, url: &str) -> Result<String> {
        let mut response = self.agent.get(url).call()?;
        let body = response.body_mut().read_to_string()?;
        Ok(body)
    }

    fn fetch_range(&self, url: &str, entry: &IndexEntry, out: &mut File) -> Result<u64> {
        let end = entry.offset + entry.length - 1;
        let mut response = self
            .agent
            .get(url)
            .header("Range", format!("bytes={}-{end}", entry.offset))
            .call()?;
        let mut reader = response.body_mut().as_reader();
        let copied = io::copy(&mut reader, out)?;
        Ok(copied)
    }

    fn file_url(&self, cycle: &ForecastCycle, step: u32, suffix: &str) -> String {
        format!(
            "{endpoint}/{date}/{time}z/ifs/{RESOLUTION}/{STREAM}/{date}{time}0000-{step}h-{STREAM}-fc.{suffix}",
            endpoint = self.endpoint,
            date = cycle.date_param(),
            time = cycle.time_param(),
        )
    }
}

impl CycleProbe for OpenDataClient {
    /// Availability check against the cycle's step-0 index file.
    ///
    /// HTTP 404 is a definitive not-published answer. Anything else that
    /// keeps the request from completing is a transport failure and is
    /// reported as such so the caller can tell the two apart.
    fn probe(&self, cycle: &ForecastCycle) -> Result<Availability> {
        let url = self.file_url(cycle, 0, "index");
        match self.agent.head(url.as_str()).call() {
            Ok(_) => Ok(Availability::Published),
            Err(ureq::Error::StatusCode(404)) => Ok(Availability::NotPublished),
            Err(err) => Err(anyhow::Error::new(err)).with_context(|| format!("probe {url}")),
        }
    }
}

/// Parse the index body and keep the entries matching `variables`.
fn select_entries(index: &str, variables: &VariableSet) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in index.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: IndexEntry = serde_json::from_str(line)
            .with_context(|| format!("parse index line {}", lineno + 1))?;
        if entry_matches(&entry, variables) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn entry_matches(entry: &IndexEntry, variables: &VariableSet) -> bool {
    if entry.length == 0 {
        return false;
    }
    if entry.levtype.as_deref() != Some(variables.levtype) {
        return false;
    }
    if !variables.wants_param(&entry.param) {
        return false;
    }
    match &entry.levelist {
        Some(level) => level
            .parse::<u32>()
            .map(|l| variables.wants_level(l))
            .unwrap_or(false),
        None => variables.levels.is_empty(),
    }
}
