//! Core model for chart history extraction: records, reduced indexes, clinical
//! notes and the deltas between them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod diff;
pub mod reduce;
pub mod temporal;

pub use diff::{assemble, diff_notes, group_by_author, DiffOp, DiffReport, LineDiff, SkippedNote};
pub use reduce::{reduce, EarliestWins, ReducedEntry, ReducedIndex, SharedReducer};
pub use temporal::{parse_timestamp, resolve, ResolverState, TemporalResolver};

/// Tunables for a single extraction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChartConfig {
    pub walk: WalkConfig,
    pub diff: DiffConfig,
    pub history: HistoryConfig,
}

/// Pagination bounds for one walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WalkConfig {
    /// Page-index spacing between steps. `None` uses the sheet's own stride.
    pub stride: Option<u32>,
    /// Hard cap on pages yielded by one walk.
    pub max_steps: Option<usize>,
    /// Extra attempts at a page whose fetch failed.
    pub retries: u32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            stride: None,
            max_steps: Some(100),
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffConfig {
    /// Notes with fewer segments than this are skipped entirely.
    pub min_segments: usize,
    /// Emit each author's deltas newest first.
    pub reverse: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            min_segments: Segment::DISPLAY_ORDER.len(),
            reverse: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Joins free-text entries that resolve to the same timestamp.
    pub separator: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            separator: "; ".to_string(),
        }
    }
}

/// Named sheets exposed by the chart backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Sheet {
    BasicInfo,
    Tpr,
    IcuMonitor,
    Pharmacology,
    PressureSore,
    Wound,
    Handover,
    NursingHandover,
    VisitList,
    VisitNote,
    NursingLog,
    NursingAdmission,
    Orders,
}

impl Sheet {
    /// Identifier used by the backend inside page links.
    pub fn code(self) -> &'static str {
        match self {
            Sheet::BasicInfo => "1",
            Sheet::Tpr => "2",
            Sheet::IcuMonitor => "3",
            Sheet::Pharmacology => "4",
            Sheet::PressureSore => "6",
            Sheet::Wound => "7",
            Sheet::Handover => "8",
            Sheet::NursingHandover => "9998",
            Sheet::VisitList => "visits",
            Sheet::VisitNote => "note",
            Sheet::NursingLog => "nursing",
            Sheet::NursingAdmission => "adm",
            Sheet::Orders => "orders",
        }
    }

    /// Stable directory-friendly name.
    pub fn slug(self) -> &'static str {
        match self {
            Sheet::BasicInfo => "basic_info",
            Sheet::Tpr => "tpr",
            Sheet::IcuMonitor => "icu_monitor",
            Sheet::Pharmacology => "pharmacology",
            Sheet::PressureSore => "pressure_sore",
            Sheet::Wound => "wound",
            Sheet::Handover => "handover",
            Sheet::NursingHandover => "nursing_handover",
            Sheet::VisitList => "visit_list",
            Sheet::VisitNote => "visit_note",
            Sheet::NursingLog => "nursing_log",
            Sheet::NursingAdmission => "nursing_admission",
            Sheet::Orders => "orders",
        }
    }

    /// Page-index spacing the backend uses between consecutive pages.
    pub fn default_stride(self) -> u32 {
        match self {
            Sheet::VisitList
            | Sheet::VisitNote
            | Sheet::NursingLog
            | Sheet::NursingAdmission
            | Sheet::Orders => 1,
            _ => 12,
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// One page of one sheet for one encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PageLocator {
    pub sheet: Sheet,
    pub encounter: String,
    pub page: u32,
}

impl PageLocator {
    /// Most recent page of a sheet.
    pub fn first(sheet: Sheet, encounter: impl Into<String>) -> Self {
        Self {
            sheet,
            encounter: encounter.into(),
            page: 1,
        }
    }

    /// The next (earlier) page, `stride` indexes further on.
    pub fn advance(&self, stride: u32) -> Self {
        Self {
            sheet: self.sheet,
            encounter: self.encounter.clone(),
            page: self.page + stride,
        }
    }

    /// Link form the backend uses to reference this page.
    pub fn link(&self) -> String {
        format!("Page={}-{}-{}", self.sheet.code(), self.encounter, self.page)
    }

    /// Whether `href` points at this locator's sheet and page index.
    ///
    /// The encounter part is not compared: the backend links pages by its own
    /// internal id, which need not match the encounter id used here.
    pub fn is_link_to(&self, href: &str) -> bool {
        let Some((_, query)) = href.split_once("Page=") else {
            return false;
        };
        let query = query.split('&').next().unwrap_or_default();
        let Some((sheet, rest)) = query.split_once('-') else {
            return false;
        };
        let Some((_, page)) = rest.rsplit_once('-') else {
            return false;
        };
        sheet == self.sheet.code() && page.parse::<u32>().ok() == Some(self.page)
    }
}

impl fmt::Display for PageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.sheet, self.encounter, self.page)
    }
}

/// A dated line of free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemporalEntry {
    pub timestamp: NaiveDateTime,
    pub text: String,
}

/// One extracted observation about a logical subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub timestamp: NaiveDateTime,
    pub author: Option<String>,
    pub value: String,
}

impl Record {
    pub fn new(
        key: impl Into<String>,
        timestamp: NaiveDateTime,
        author: Option<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            timestamp,
            author,
            value: value.into(),
        }
    }
}

/// Sections of a clinical note, declared in display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Diagnosis,
    Subjective,
    Objective,
    Plan,
}

impl Segment {
    pub const DISPLAY_ORDER: [Segment; 4] = [
        Segment::Diagnosis,
        Segment::Subjective,
        Segment::Objective,
        Segment::Plan,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Segment::Diagnosis => "Diagnosis",
            Segment::Subjective => "Subjective",
            Segment::Objective => "Objective",
            Segment::Plan => "Assessment & Plan",
        }
    }
}

/// A clinical note split into its segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: String,
    pub author: String,
    pub timestamp: NaiveDateTime,
    pub segments: BTreeMap<Segment, Vec<String>>,
}

impl Note {
    /// Number of segments the source page actually carried.
    pub fn present_segments(&self) -> usize {
        self.segments.len()
    }

    /// Lines of a segment; empty when the segment is absent.
    pub fn lines(&self, segment: Segment) -> &[String] {
        self.segments
            .get(&segment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// All notes written by one author, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorGroup {
    pub author: String,
    pub notes: Vec<Note>,
}

/// Segment-wise change between two consecutive notes of one author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub author: String,
    pub from_id: String,
    pub to_id: String,
    pub from_timestamp: NaiveDateTime,
    pub to_timestamp: NaiveDateTime,
    pub segments: BTreeMap<Segment, LineDiff>,
}

impl Delta {
    pub fn has_changes(&self) -> bool {
        self.segments.values().any(|diff| !diff.is_unchanged())
    }
}

/// Errors raised while walking, extracting or reducing chart history.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("session expired")]
    SessionExpired,
    #[error("failed to fetch {locator}: {reason}")]
    FetchFailure { locator: String, reason: String },
    #[error("no recognizable date in {0:?}")]
    UnparsableDate(String),
    #[error("note {id} carries {present} of {required} required segments")]
    IncompleteDocument {
        id: String,
        present: usize,
        required: usize,
    },
    #[error("{0} history needs an admission date")]
    MissingReference(String),
    #[error("edit script does not apply: {0}")]
    DiffMismatch(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not parse {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChartError {
    /// Failures that end a run rather than a single line or document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChartError::AuthFailure(_) | ChartError::FetchFailure { .. } | ChartError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_recognises_backend_links() {
        let next = PageLocator::first(Sheet::Tpr, "I20190014727").advance(12);
        assert_eq!(next.page, 13);
        assert!(next.is_link_to("patientEncounter.aspx?Page=2-59829-13"));
        assert!(!next.is_link_to("patientEncounter.aspx?Page=2-59829-25"));
        assert!(!next.is_link_to("patientEncounter.aspx?Page=8-59829-13"));
        assert!(!next.is_link_to("patient.aspx?ChartNo=19314023"));
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let config: ChartConfig =
            serde_json::from_str(r#"{"diff": {"reverse": true}}"#).expect("config parses");
        assert!(config.diff.reverse);
        assert_eq!(config.diff.min_segments, 4);
        assert_eq!(config.walk.max_steps, Some(100));
        assert_eq!(config.walk.retries, 2);
        assert_eq!(config.history.separator, "; ");
    }

    #[test]
    fn segments_sort_in_display_order() {
        let mut segments = vec![Segment::Plan, Segment::Subjective, Segment::Diagnosis];
        segments.sort();
        assert_eq!(
            segments,
            vec![Segment::Diagnosis, Segment::Subjective, Segment::Plan]
        );
    }
}
