//! Forecast cycle identification and the latest-cycle scan.
//!
//! IFS runs four times a day and each cycle appears on the dissemination
//! service a few hours after its nominal time. The scan walks backward from
//! "now" and returns the newest cycle the provider actually serves.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use std::fmt;
use tracing::{debug, info, warn};

/// IFS initialization hours, UTC.
pub const CYCLE_HOURS: [u32; 4] = [0, 6, 12, 18];

/// Hours between a cycle's nominal time and its expected publication.
pub const PUBLICATION_DELAY_HOURS: i64 = 4;

/// How far back, in offset hours, the scan looks for a published cycle.
pub const SCAN_WINDOW_HOURS: i64 = 48;

/// One model initialization: a date plus one of the four daily cycle hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForecastCycle {
    datetime: DateTime<Utc>,
}

impl ForecastCycle {
    /// Build a cycle on `date` at `hour`. Returns `None` for hours outside
    /// the daily schedule.
    pub fn on(date: NaiveDate, hour: u32) -> Option<Self> {
        if !CYCLE_HOURS.contains(&hour) {
            return None;
        }
        let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
        Some(Self {
            datetime: date.and_time(time).and_utc(),
        })
    }

    /// Nominal initialization time.
    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }

    /// Cycle hour (0, 6, 12, or 18).
    pub fn hour(&self) -> u32 {
        self.datetime.hour()
    }

    /// Date component formatted for the dissemination service, `YYYYMMDD`.
    pub fn date_param(&self) -> String {
        self.datetime.format("%Y%m%d").to_string()
    }

    /// Hour component formatted for the dissemination service, `HH`.
    pub fn time_param(&self) -> String {
        format!("{:02}", self.hour())
    }
}

impl fmt::Display for ForecastCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}Z", self.date_param(), self.hour())
    }
}

/// Definitive provider answer for a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Published,
    NotPublished,
}

/// Minimal remote availability check for one cycle.
///
/// A transport problem (connect failure, timeout, unexpected status) is an
/// `Err` and is distinct from a definitive not-published answer.
pub trait CycleProbe {
    fn probe(&self, cycle: &ForecastCycle) -> Result<Availability>;
}

/// Enumerate candidate cycles newest-first.
///
/// Offsets run 0..48h back in 6-hour steps; within each offset the four
/// cycle hours are taken in descending order. Candidates in the future or
/// not yet past the publication delay are dropped, as are duplicates from
/// offsets that land on an already-covered date.
pub fn candidate_cycles(now: DateTime<Utc>) -> Vec<ForecastCycle> {
    let mut candidates: Vec<ForecastCycle> = Vec::new();
    for hours_back in (0..SCAN_WINDOW_HOURS).step_by(6) {
        let check_time = now - Duration::hours(hours_back);
        for &hour in CYCLE_HOURS.iter().rev() {
            let Some(cycle) = ForecastCycle::on(check_time.date_naive(), hour) else {
                continue;
            };
            if cycle.datetime() > now {
                continue;
            }
            if now - cycle.datetime() <= Duration::hours(PUBLICATION_DELAY_HOURS) {
                continue;
            }
            if candidates.contains(&cycle) {
                continue;
            }
            candidates.push(cycle);
        }
    }
    candidates
}

/// Return the most recent cycle the provider reports as published.
///
/// Both a not-published answer and a transport failure move the scan to the
/// next-older candidate; neither aborts it mid-window. Transport failures
/// are counted separately so an exhausted window can report whether the
/// provider looked unreachable rather than merely behind schedule.
pub fn locate_latest_cycle<P: CycleProbe>(now: DateTime<Utc>, probe: &P) -> Result<ForecastCycle> {
    info!("detecting latest available IFS cycle");
    let candidates = candidate_cycles(now);
    let mut transport_failures = 0usize;
    for cycle in &candidates {
        match probe.probe(cycle) {
            Ok(Availability::Published) => {
                info!("latest available cycle: {cycle}");
                return Ok(*cycle);
            }
            Ok(Availability::NotPublished) => {
                debug!("cycle {cycle} not published yet");
            }
            Err(err) => {
                transport_failures += 1;
                warn!("availability probe for {cycle} failed: {err:#}");
            }
        }
    }
    bail!(
        "no available IFS cycle found in the last {SCAN_WINDOW_HOURS} hours \
         ({} candidates probed, {transport_failures} transport failures)",
        candidates.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn cycle(y: i32, m: u32, d: u32, h: u32) -> ForecastCycle {
        ForecastCycle::on(NaiveDate::from_ymd_opt(y, m, d).unwrap(), h).unwrap()
    }

    /// Probe that records every candidate it is asked about.
    struct ScriptedProbe {
        publish_all: bool,
        published: Vec<ForecastCycle>,
        transport_fail: Vec<ForecastCycle>,
        probed: RefCell<Vec<ForecastCycle>>,
    }

    impl ScriptedProbe {
        fn new() -> Self {
            Self {
                publish_all: false,
                published: Vec::new(),
                transport_fail: Vec::new(),
                probed: RefCell::new(Vec::new()),
            }
        }

        fn publishing_everything() -> Self {
            Self {
                publish_all: true,
                ..Self::new()
            }
        }
    }

    impl CycleProbe for ScriptedProbe {
        fn probe(&self, cycle: &ForecastCycle) -> Result<Availability> {
            self.probed.borrow_mut().push(*cycle);
            if self.transport_fail.contains(cycle) {
                bail!("connection reset");
            }
            if self.publish_all || self.published.contains(cycle) {
                Ok(Availability::Published)
            } else {
                Ok(Availability::NotPublished)
            }
        }
    }

    #[test]
    fn rejects_candidates_inside_publication_delay() {
        // 06Z is exactly four hours old and 12Z is in the future; neither
        // may be probed even though the probe would report them published.
        let now = utc(2024, 1, 15, 10);
        let probe = ScriptedProbe::publishing_everything();
        let found = locate_latest_cycle(now, &probe).unwrap();
        assert_eq!(found, cycle(2024, 1, 15, 0));
        for probed in probe.probed.borrow().iter() {
            assert!(now - probed.datetime() > Duration::hours(PUBLICATION_DELAY_HOURS));
        }
    }

    #[test]
    fn probes_same_day_cycle_before_any_prior_day_hour() {
        let now = utc(2024, 1, 15, 10);
        let candidates = candidate_cycles(now);
        assert_eq!(
            &candidates[..5],
            &[
                cycle(2024, 1, 15, 0),
                cycle(2024, 1, 14, 18),
                cycle(2024, 1, 14, 12),
                cycle(2024, 1, 14, 6),
                cycle(2024, 1, 14, 0),
            ]
        );
    }

    #[test]
    fn candidates_are_strictly_newest_first() {
        let now = utc(2024, 3, 2, 23);
        let candidates = candidate_cycles(now);
        assert!(!candidates.is_empty());
        for pair in candidates.windows(2) {
            assert!(pair[0].datetime() > pair[1].datetime());
        }
    }

    #[test]
    fn returns_newest_published_cycle() {
        let now = utc(2024, 1, 15, 10);
        let mut probe = ScriptedProbe::new();
        probe.published = vec![cycle(2024, 1, 14, 12), cycle(2024, 1, 14, 0)];
        let found = locate_latest_cycle(now, &probe).unwrap();
        assert_eq!(found, cycle(2024, 1, 14, 12));
    }

    #[test]
    fn transport_failure_moves_to_next_candidate() {
        let now = utc(2024, 1, 15, 10);
        let mut probe = ScriptedProbe::new();
        probe.transport_fail = vec![cycle(2024, 1, 15, 0)];
        probe.published = vec![cycle(2024, 1, 14, 18)];
        let found = locate_latest_cycle(now, &probe).unwrap();
        assert_eq!(found, cycle(2024, 1, 14, 18));
        assert_eq!(probe.probed.borrow().len(), 2);
    }

    #[test]
    fn exhausted_window_is_a_terminal_error() {
        let now = utc(2024, 1, 15, 10);
        let probe = ScriptedProbe::new();
        let err = locate_latest_cycle(now, &probe).unwrap_err();
        assert!(err.to_string().contains("no available IFS cycle"));
    }

    #[test]
    fn rejects_off_schedule_hours() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert!(ForecastCycle::on(date, 3).is_none());
        assert!(ForecastCycle::on(date, 12).is_some());
    }

    #[test]
    fn formats_service_parameters() {
        let c = cycle(2024, 1, 15, 6);
        assert_eq!(c.date_param(), "20240115");
        assert_eq!(c.time_param(), "06");
        assert_eq!(c.to_string(), "20240115 06Z");
    }
}
