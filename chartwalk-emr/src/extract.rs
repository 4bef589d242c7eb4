//! Turns fetched pages into timestamped records.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chartwalk_core::{
    parse_timestamp, ChartError, HistoryConfig, Record, Sheet, TemporalResolver,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::cell;
use crate::Document;

/// Field on the basic-info sheet holding the unit admission time.
pub const ADMISSION_FIELD: &str = "轉入本單位日期時間";

const TPR_TABLE: &str = "mainTBL";
const TPR_TIME_ROW: &str = "time";
const TPR_TIME_FORMAT: &str = "%d-%m-%Y %H:%M";
const NURSING_TABLE: &str = "events";
const SYSTOLIC_ROW: &str = "Systolic BP";
const DIASTOLIC_ROW: &str = "Diastolic BP";
const ORDER_TABLES: [&str; 2] = ["regular", "stat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Temperature,
    HeartRate,
    RespiratoryRate,
    SystolicBp,
    DiastolicBp,
    NursingEvent,
    NursingAdmission,
    Order,
    Diagnosis,
    Surgery,
    Respiration,
    Imaging,
    Vaccination,
}

impl RecordKind {
    pub const ALL: [RecordKind; 13] = [
        RecordKind::Temperature,
        RecordKind::HeartRate,
        RecordKind::RespiratoryRate,
        RecordKind::SystolicBp,
        RecordKind::DiastolicBp,
        RecordKind::NursingEvent,
        RecordKind::NursingAdmission,
        RecordKind::Order,
        RecordKind::Diagnosis,
        RecordKind::Surgery,
        RecordKind::Respiration,
        RecordKind::Imaging,
        RecordKind::Vaccination,
    ];

    /// Sheet the records of this kind are read from.
    pub fn sheet(self) -> Sheet {
        match self {
            RecordKind::Temperature
            | RecordKind::HeartRate
            | RecordKind::RespiratoryRate
            | RecordKind::SystolicBp
            | RecordKind::DiastolicBp => Sheet::Tpr,
            RecordKind::NursingEvent => Sheet::NursingLog,
            RecordKind::NursingAdmission => Sheet::NursingAdmission,
            RecordKind::Order => Sheet::Orders,
            RecordKind::Diagnosis => Sheet::VisitNote,
            RecordKind::Surgery
            | RecordKind::Respiration
            | RecordKind::Imaging
            | RecordKind::Vaccination => Sheet::Handover,
        }
    }

    /// Short name used on the command line and in output file names.
    pub fn slug(self) -> &'static str {
        match self {
            RecordKind::Temperature => "temp",
            RecordKind::HeartRate => "hr",
            RecordKind::RespiratoryRate => "rr",
            RecordKind::SystolicBp => "sbp",
            RecordKind::DiastolicBp => "dbp",
            RecordKind::NursingEvent => "nursing",
            RecordKind::NursingAdmission => "admission",
            RecordKind::Order => "orders",
            RecordKind::Diagnosis => "diag",
            RecordKind::Surgery => "surgery",
            RecordKind::Respiration => "respiration",
            RecordKind::Imaging => "cxr",
            RecordKind::Vaccination => "vaccine",
        }
    }

    /// Whether records come from dated free text resolved against the admission.
    pub fn is_free_text(self) -> bool {
        self.sheet() == Sheet::Handover
    }

    fn history_field(self) -> Option<&'static str> {
        match self {
            RecordKind::Surgery => Some("手術 - 手術"),
            RecordKind::Respiration => Some("呼吸歷程 - 呼吸歷程"),
            RecordKind::Imaging => Some("CXR/檢查 - 呼吸系統"),
            RecordKind::Vaccination => Some("疫苗"),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for RecordKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| ChartError::Config(format!("unknown record kind {s:?}")))
    }
}

/// Per-encounter inputs shared by all pages of one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractContext {
    pub admission: Option<NaiveDateTime>,
    pub separator: String,
}

impl ExtractContext {
    pub fn new(history: &HistoryConfig) -> Self {
        Self {
            admission: None,
            separator: history.separator.clone(),
        }
    }

    pub fn with_admission(mut self, admission: Option<NaiveDateTime>) -> Self {
        self.admission = admission;
        self
    }
}

/// Unit admission time from the basic-info page.
pub fn admission_timestamp(basic_info: &Document) -> Option<NaiveDateTime> {
    basic_info
        .field(ADMISSION_FIELD)?
        .stripped_lines()
        .find_map(parse_timestamp)
}

/// Records of `kind` found on one page.
pub fn extract(
    document: &Document,
    kind: RecordKind,
    context: &ExtractContext,
) -> Result<Vec<Record>, ChartError> {
    match kind {
        RecordKind::Temperature => Ok(vital_signs(document, "- B. T.(C)", Some("- 體溫部位"))),
        RecordKind::HeartRate => Ok(vital_signs(document, "Heart Rate", None)),
        RecordKind::RespiratoryRate => Ok(vital_signs(document, "Respiration", None)),
        RecordKind::SystolicBp => Ok(vital_signs(document, SYSTOLIC_ROW, None)),
        RecordKind::DiastolicBp => Ok(vital_signs(document, DIASTOLIC_ROW, None)),
        RecordKind::NursingEvent => nursing_events(document),
        RecordKind::NursingAdmission => nursing_admission(document),
        RecordKind::Order => Ok(orders(document)),
        RecordKind::Diagnosis => diagnoses(document),
        RecordKind::Surgery
        | RecordKind::Respiration
        | RecordKind::Imaging
        | RecordKind::Vaccination => free_text(document, kind, context),
    }
}

/// Reads one measurement row of the TPR grid, column by column.
///
/// With a `site_row` a reading is only kept when its column also names the
/// body site; the site becomes part of the key.
fn vital_signs(document: &Document, value_row: &str, site_row: Option<&str>) -> Vec<Record> {
    let Some(table) = document.table(TPR_TABLE) else {
        return Vec::new();
    };
    let (Some(times), Some(values)) = (table.row(TPR_TIME_ROW), table.row(value_row)) else {
        debug!(row = value_row, "vital sign rows missing");
        return Vec::new();
    };
    let label = value_row.trim_start_matches("- ");
    let sites = site_row.and_then(|row| table.row(row));
    if site_row.is_some() && sites.is_none() {
        return Vec::new();
    }

    let mut records = Vec::new();
    for column in 1..values.len() {
        let Some(value) = cell(values, column) else {
            continue;
        };
        let Some(raw_time) = cell(times, column) else {
            continue;
        };
        let Ok(timestamp) = NaiveDateTime::parse_from_str(raw_time, TPR_TIME_FORMAT) else {
            debug!(time = raw_time, "skipping column with unreadable time");
            continue;
        };
        let record = match sites {
            Some(sites) => match cell(sites, column) {
                Some(site) => Record::new(
                    format!("{label} ({site})"),
                    timestamp,
                    None,
                    format!("{value}({site})"),
                ),
                None => continue,
            },
            None => Record::new(label, timestamp, None, value),
        };
        records.push(record);
    }
    records
}

fn page_date(document: &Document) -> Option<NaiveDate> {
    let raw = document.date.as_deref()?.trim();
    NaiveDate::parse_from_str(raw, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Rows of time, event type, assessment and action on a daily nursing page.
fn nursing_events(document: &Document) -> Result<Vec<Record>, ChartError> {
    let Some(table) = document.table(NURSING_TABLE) else {
        return Ok(Vec::new());
    };
    let date = page_date(document)
        .ok_or_else(|| ChartError::MissingReference(RecordKind::NursingEvent.to_string()))?;

    let records = table
        .rows
        .iter()
        .filter_map(|row| {
            let time = NaiveTime::parse_from_str(cell(row, 0)?, "%H:%M").ok()?;
            let event = cell(row, 1)?;
            let action = cell(row, 3)?;
            let value = match cell(row, 2) {
                Some(assessment) => format!("{assessment}: {action}"),
                None => action.to_string(),
            };
            Some(Record::new(event, date.and_time(time), None, value))
        })
        .collect();
    Ok(records)
}

/// Labelled boxes of the admission nursing assessment, with the key each is
/// reported under.
const ADMISSION_ITEMS: [(&str, &str); 28] = [
    ("病歷號", "pid"),
    ("病患姓名", "name"),
    ("生日", "dob"),
    ("性別", "gender"),
    ("入院診斷", "diagnosis"),
    ("身高", "height"),
    ("體重", "weight"),
    ("生命徵象", "vitals"),
    ("家族病史", "family_history"),
    ("過去病史", "medical_history"),
    ("長期用藥", "longterm_drugs"),
    ("藥物過敏史", "medication_allergies"),
    ("食物過敏史", "food_allergies"),
    ("其他過敏史", "other_allergies"),
    ("此次發病經過", "present_illness"),
    ("靈性", "religion"),
    ("個人史", "personal_history"),
    ("家族史", "family_history_eval"),
    ("神經", "neuro"),
    ("感官", "sensory"),
    ("呼吸", "respiration"),
    ("心血管", "cardiovascular"),
    ("消化", "digestion"),
    ("泌尿/生殖", "urogenital"),
    ("肌肉骨骼", "musculoskeletal"),
    ("皮膚", "skin"),
    ("血型", "bloodtype"),
    ("常規", "routine"),
];

/// One record per filled box of the admission assessment, all at the time
/// the assessment was written.
fn nursing_admission(document: &Document) -> Result<Vec<Record>, ChartError> {
    let header = document.header.as_deref().unwrap_or_default();
    let timestamp = parse_timestamp(header)
        .or_else(|| page_date(document).map(|date| date.and_time(NaiveTime::MIN)))
        .ok_or_else(|| ChartError::MissingReference(RecordKind::NursingAdmission.to_string()))?;

    Ok(ADMISSION_ITEMS
        .iter()
        .filter_map(|(label, key)| {
            let lines: Vec<&str> = document.field_exact(label)?.stripped_lines().collect();
            if lines.is_empty() {
                return None;
            }
            Some(Record::new(*key, timestamp, None, lines.join("\n")))
        })
        .collect())
}

/// Rows of order type, order text and start time (`YYYY-MM-DD HHMM -- ...`).
fn orders(document: &Document) -> Vec<Record> {
    ORDER_TABLES
        .iter()
        .filter_map(|name| document.table(name))
        .flat_map(|table| table.rows.iter())
        .filter_map(|row| {
            let order_type = cell(row, 0)?;
            let order = cell(row, 1)?;
            let start = cell(row, 2)?.split("--").next()?.trim();
            let timestamp = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H%M").ok()?;
            Some(Record::new(order, timestamp, None, order_type))
        })
        .collect()
}

/// Diagnosis lines of a visit note, dated by the note header.
fn diagnoses(document: &Document) -> Result<Vec<Record>, ChartError> {
    let Some(field) = document.field_exact("Diagnosis") else {
        return Ok(Vec::new());
    };
    let header = document.header.as_deref().unwrap_or_default();
    let timestamp =
        parse_timestamp(header).ok_or_else(|| ChartError::UnparsableDate(header.to_string()))?;

    Ok(field
        .stripped_lines()
        .map(|line| {
            let key = line.split_whitespace().collect::<Vec<_>>().join(" ");
            Record::new(key, timestamp, document.author.clone(), line)
        })
        .collect())
}

static VACCINE_LINE_RE: OnceLock<Regex> = OnceLock::new();

fn vaccine_line_re() -> &'static Regex {
    VACCINE_LINE_RE.get_or_init(|| {
        Regex::new(r"^\s*◎(.+?)\s+[^\s:：]+[:：]\s*(\d{4}/\d{1,2}/\d{1,2})\s*$")
            .expect("vaccine line pattern is valid")
    })
}

/// `◎BCG 接種日期:2019/07/02` becomes `2019/07/02 BCG`.
fn date_first(line: &str) -> String {
    match vaccine_line_re().captures(line) {
        Some(caps) => format!("{} {}", &caps[2], caps[1].trim()),
        None => line.to_string(),
    }
}

/// Dated lines of a handover history block, merged per timestamp.
fn free_text(
    document: &Document,
    kind: RecordKind,
    context: &ExtractContext,
) -> Result<Vec<Record>, ChartError> {
    let Some(field) = kind.history_field().and_then(|label| document.field(label)) else {
        return Ok(Vec::new());
    };
    let admission = context
        .admission
        .ok_or_else(|| ChartError::MissingReference(kind.to_string()))?;

    let mut resolver = TemporalResolver::new(admission);
    let mut merged: Vec<(NaiveDateTime, String)> = Vec::new();
    let mut by_time: HashMap<NaiveDateTime, usize> = HashMap::new();

    for line in field.stripped_lines() {
        let line = if kind == RecordKind::Vaccination {
            date_first(line)
        } else {
            line.to_string()
        };
        let entry = match resolver.resolve_line(&line) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(%kind, error = %err, "skipping history line");
                continue;
            }
        };
        match by_time.get(&entry.timestamp) {
            Some(&index) => {
                let text = &mut merged[index].1;
                text.push_str(&context.separator);
                text.push_str(&entry.text);
            }
            None => {
                by_time.insert(entry.timestamp, merged.len());
                merged.push((entry.timestamp, entry.text));
            }
        }
    }

    let key = kind.slug();
    Ok(merged
        .into_iter()
        .map(|(timestamp, text)| Record::new(key, timestamp, None, text))
        .collect())
}
