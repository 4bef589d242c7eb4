//! Date resolution for history lines that may omit the year.
//!
//! Lines are expected to start with `YYYY/M/D` (or `YYYY-M-D`) or with a bare
//! `M/D`. Bare dates take the reference year. Within one walk a single
//! December to January wrap is recognised and moves the year forward; any
//! later backwards jump is taken at face value.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::{ChartError, TemporalEntry};

static FULL_DATE_RE: OnceLock<Regex> = OnceLock::new();
static PARTIAL_DATE_RE: OnceLock<Regex> = OnceLock::new();
static EMBEDDED_TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();

fn full_date_re() -> &'static Regex {
    FULL_DATE_RE.get_or_init(|| {
        Regex::new(
            r"^[ \t]*(\d{4})[/-](\d{1,2})[/-](\d{1,2})(?:[ \t]+(\d{1,2}):(\d{2}))?[ \t]*(.*)$",
        )
        .expect("full date pattern is valid")
    })
}

fn partial_date_re() -> &'static Regex {
    PARTIAL_DATE_RE.get_or_init(|| {
        Regex::new(r"^[ \t]*(\d{1,2})/(\d{1,2})(?:[ \t]+(\d{1,2}):(\d{2}))?[ \t]*(.*)$")
            .expect("partial date pattern is valid")
    })
}

fn embedded_timestamp_re() -> &'static Regex {
    EMBEDDED_TIMESTAMP_RE.get_or_init(|| {
        Regex::new(r"(\d{4})[/-](\d{1,2})[/-](\d{1,2})\s+(\d{1,2}):(\d{2})")
            .expect("timestamp pattern is valid")
    })
}

/// Per-walk resolution state. Never share one between concurrent walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverState {
    pub last_resolved: NaiveDateTime,
    pub rollover_applied: bool,
}

impl ResolverState {
    pub fn new(seed: NaiveDateTime) -> Self {
        Self {
            last_resolved: seed,
            rollover_applied: false,
        }
    }
}

/// Date components read off the start of a line.
struct DatePrefix<'a> {
    year: Option<i32>,
    month: u32,
    day: u32,
    time: Option<(u32, u32)>,
    rest: &'a str,
}

fn read_prefix(raw: &str) -> Option<DatePrefix<'_>> {
    if let Some(caps) = full_date_re().captures(raw) {
        return Some(DatePrefix {
            year: Some(caps[1].parse().ok()?),
            month: caps[2].parse().ok()?,
            day: caps[3].parse().ok()?,
            time: read_time(caps.get(4), caps.get(5))?,
            rest: caps.get(6).map_or("", |m| m.as_str()),
        });
    }

    let caps = partial_date_re().captures(raw)?;
    Some(DatePrefix {
        year: None,
        month: caps[1].parse().ok()?,
        day: caps[2].parse().ok()?,
        time: read_time(caps.get(3), caps.get(4))?,
        rest: caps.get(5).map_or("", |m| m.as_str()),
    })
}

/// `Some(None)` when no time was written, `None` when it was written but unreadable.
fn read_time(
    hour: Option<regex::Match<'_>>,
    minute: Option<regex::Match<'_>>,
) -> Option<Option<(u32, u32)>> {
    match (hour, minute) {
        (Some(h), Some(m)) => Some(Some((h.as_str().parse().ok()?, m.as_str().parse().ok()?))),
        _ => Some(None),
    }
}

fn build(year: i32, month: u32, day: u32, time: Option<(u32, u32)>) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = match time {
        Some((hour, minute)) => NaiveTime::from_hms_opt(hour, minute, 0)?,
        None => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// Resolve the date prefix of `raw` against the walk state.
///
/// Returns the resolved entry (with the date stripped from its text) together
/// with the state to thread into the next call. Bare `M/D` dates use the year
/// of `reference`, or the following year once the walk has rolled over.
pub fn resolve(
    raw: &str,
    state: ResolverState,
    reference: NaiveDate,
) -> Result<(TemporalEntry, ResolverState), ChartError> {
    let unparsable = || ChartError::UnparsableDate(raw.to_string());
    let prefix = read_prefix(raw).ok_or_else(unparsable)?;

    let year = prefix
        .year
        .unwrap_or_else(|| reference.year() + i32::from(state.rollover_applied));
    let candidate = build(year, prefix.month, prefix.day, prefix.time).ok_or_else(unparsable)?;

    let last = state.last_resolved;
    let wraps_year = candidate < last && candidate.month() == 1 && last.month() == 12;

    let mut next = state;
    let timestamp = if wraps_year && !state.rollover_applied {
        next.rollover_applied = true;
        build(last.year() + 1, prefix.month, prefix.day, prefix.time).ok_or_else(unparsable)?
    } else {
        candidate
    };
    next.last_resolved = timestamp;

    Ok((
        TemporalEntry {
            timestamp,
            text: prefix.rest.trim_end().to_string(),
        },
        next,
    ))
}

/// Owns the state for one walk over a block of history lines.
#[derive(Debug, Clone)]
pub struct TemporalResolver {
    reference: NaiveDate,
    state: ResolverState,
}

impl TemporalResolver {
    /// Seeds the walk with the admission time; its year is the reference year.
    pub fn new(admission: NaiveDateTime) -> Self {
        Self {
            reference: admission.date(),
            state: ResolverState::new(admission),
        }
    }

    /// Resolve one line. A failed line leaves the state untouched.
    pub fn resolve_line(&mut self, raw: &str) -> Result<TemporalEntry, ChartError> {
        let (entry, next) = resolve(raw, self.state, self.reference)?;
        self.state = next;
        Ok(entry)
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }
}

/// Find a fully qualified `YYYY/MM/DD HH:MM` anywhere in `text`.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let caps = embedded_timestamp_re().captures(text)?;
    build(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        Some((caps[4].parse().ok()?, caps[5].parse().ok()?)),
    )
}
