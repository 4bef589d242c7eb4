//! Visit list entries and the clinical notes behind them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chartwalk_core::{parse_timestamp, ChartError, Note, Segment};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::cell;
use crate::Document;

const VISIT_TABLE: &str = "visits";

/// Setting of a visit, read off the first letter of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitClass {
    Outpatient,
    Inpatient,
    Emergency,
}

impl VisitClass {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.chars().next()? {
            'O' => Some(VisitClass::Outpatient),
            'I' => Some(VisitClass::Inpatient),
            'E' => Some(VisitClass::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for VisitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VisitClass::Outpatient => "outpatient",
            VisitClass::Inpatient => "inpatient",
            VisitClass::Emergency => "emergency",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEntry {
    pub id: String,
    pub class: VisitClass,
    pub timestamp: Option<NaiveDateTime>,
    pub author: Option<String>,
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ChartError> {
        if start > end {
            return Err(ChartError::Config(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        (self.start..=self.end).contains(&timestamp.date())
    }
}

/// Rows of `[visit id, visit time, attending]` from the visit list page.
pub fn visits_from_document(document: &Document) -> Vec<VisitEntry> {
    let Some(table) = document.table(VISIT_TABLE) else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .filter_map(|row| {
            let id = cell(row, 0)?;
            let Some(class) = VisitClass::from_id(id) else {
                debug!(id, "skipping visit of unknown class");
                return None;
            };
            Some(VisitEntry {
                id: id.to_string(),
                class,
                timestamp: cell(row, 1).and_then(parse_timestamp),
                author: cell(row, 2).map(str::to_string),
            })
        })
        .collect()
}

/// Visits of the given classes inside `range`; undated visits never match a range.
pub fn select_visits<'a>(
    visits: &'a [VisitEntry],
    classes: &[VisitClass],
    range: Option<&DateRange>,
) -> Vec<&'a VisitEntry> {
    visits
        .iter()
        .filter(|visit| classes.contains(&visit.class))
        .filter(|visit| match (range, visit.timestamp) {
            (None, _) => true,
            (Some(range), Some(timestamp)) => range.contains(timestamp),
            (Some(_), None) => false,
        })
        .collect()
}

/// Distinct visit ids per class, classes in outpatient, inpatient, emergency order.
pub fn encounter_ids(visits: &[VisitEntry]) -> BTreeMap<VisitClass, BTreeSet<String>> {
    let mut grouped: BTreeMap<VisitClass, BTreeSet<String>> = BTreeMap::new();
    for visit in visits {
        grouped
            .entry(visit.class)
            .or_default()
            .insert(visit.id.clone());
    }
    grouped
}

/// Build a note from a visit page. Only segments the page carries are present.
pub fn note_from_document(visit: &VisitEntry, document: &Document) -> Result<Note, ChartError> {
    let header = document.header.as_deref().unwrap_or_default();
    let timestamp = parse_timestamp(header)
        .or(visit.timestamp)
        .ok_or_else(|| ChartError::UnparsableDate(header.to_string()))?;
    let author = visit
        .author
        .clone()
        .or_else(|| document.author.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let segments: BTreeMap<Segment, Vec<String>> = Segment::DISPLAY_ORDER
        .into_iter()
        .filter_map(|segment| {
            let field = document.field_exact(segment.title())?;
            Some((segment, field.stripped_lines().map(str::to_string).collect()))
        })
        .collect();

    Ok(Note {
        id: visit.id.clone(),
        author,
        timestamp,
        segments,
    })
}
