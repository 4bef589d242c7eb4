use std::fs;
use std::path::PathBuf;

use chartwalk_core::{ChartConfig, ChartError, ReducedIndex, Segment};
use chartwalk_emr::{
    assemble_diffs, collect_diagnoses, collect_history, encounter_ids, list_visits,
    open_directory, write_artifact, Artifact, Credentials, DateRange, DocumentFetcher,
    HtmlSink, RecordKind, VisitClass,
};
use chrono::{Duration, NaiveDate};

const CHART: &str = "19314023";
const ENCOUNTER: &str = "I20190014727";

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR")))
}

fn open_chart() -> impl DocumentFetcher {
    open_directory(
        fixture_path("chart"),
        CHART,
        Credentials::new("nurse01", "nicu2019"),
        Duration::minutes(5),
    )
    .expect("fixture chart opens")
}

#[test]
fn diagnoses_match_golden() {
    let mut chart = open_chart();
    let index = collect_diagnoses(&mut chart, CHART, None, &ChartConfig::default())
        .expect("diagnoses collected");

    let golden = fs::read_to_string(fixture_path("diagnoses_golden.json"))
        .expect("golden index readable");
    let expected: ReducedIndex = serde_json::from_str(&golden).expect("golden index valid");
    assert_eq!(index, expected);
}

#[test]
fn date_range_limits_visits() {
    let mut chart = open_chart();
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2019, 6, 30).unwrap(),
    )
    .unwrap();
    let index = collect_diagnoses(&mut chart, CHART, Some(&range), &ChartConfig::default())
        .unwrap();
    let keys: Vec<_> = index.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["Acute bronchiolitis", "GERD"]);
    assert_eq!(index.get("GERD").unwrap().author.as_deref(), Some("Lin"));
}

#[test]
fn diff_compares_consecutive_outpatient_notes() {
    let mut chart = open_chart();
    let report = assemble_diffs(&mut chart, CHART, None, &ChartConfig::default()).unwrap();

    assert_eq!(report.deltas.len(), 1);
    let delta = &report.deltas[0];
    assert_eq!(delta.author, "Lin");
    assert_eq!((delta.from_id.as_str(), delta.to_id.as_str()), ("O1080521001", "O1080604002"));
    assert!(delta.has_changes());
    assert_eq!(delta.segments.len(), Segment::DISPLAY_ORDER.len());

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "O1080610005");
    assert_eq!(report.skipped[0].present, 2);
}

#[test]
fn temperature_walk_follows_page_links() {
    let mut chart = open_chart();
    let config = ChartConfig::default();

    let latest =
        collect_history(&mut chart, ENCOUNTER, RecordKind::Temperature, &config, false).unwrap();
    assert_eq!(latest.len(), 2);

    let all =
        collect_history(&mut chart, ENCOUNTER, RecordKind::Temperature, &config, true).unwrap();
    let values: Vec<_> = all.iter().map(|r| r.value.as_str()).collect();
    // The 12:00 reading on 2 July has no site and is dropped.
    assert_eq!(values, vec!["36.8(Ax)", "37.2(Ear)", "38.1(Ax)"]);
}

#[test]
fn handover_history_resolves_against_admission() {
    let mut chart = open_chart();
    let config = ChartConfig::default();

    let surgery =
        collect_history(&mut chart, ENCOUNTER, RecordKind::Surgery, &config, false).unwrap();
    assert_eq!(surgery.len(), 1);
    assert_eq!(surgery[0].value, "PDA ligation; chest tube insertion");
    assert_eq!(
        surgery[0].timestamp.date(),
        NaiveDate::from_ymd_opt(2019, 7, 3).unwrap()
    );

    let vaccines =
        collect_history(&mut chart, ENCOUNTER, RecordKind::Vaccination, &config, false).unwrap();
    assert_eq!(vaccines[0].value, "B型肝炎疫苗");
}

#[test]
fn nursing_and_orders_are_read() {
    let mut chart = open_chart();
    let config = ChartConfig::default();

    let nursing =
        collect_history(&mut chart, ENCOUNTER, RecordKind::NursingEvent, &config, true).unwrap();
    assert_eq!(nursing.len(), 3);
    assert_eq!(nursing[0].value, "EBM 20ml");

    let orders = collect_history(&mut chart, ENCOUNTER, RecordKind::Order, &config, false).unwrap();
    let keys: Vec<_> = orders.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["CXR portable", "Ampicillin 50mg/kg IV q12h"]);
}

#[test]
fn encounters_are_grouped_by_class() {
    let mut chart = open_chart();
    let visits = list_visits(&mut chart, CHART, &ChartConfig::default()).unwrap();
    let grouped = encounter_ids(&visits);
    assert_eq!(grouped[&VisitClass::Outpatient].len(), 3);
    assert!(grouped[&VisitClass::Inpatient].contains(ENCOUNTER));
    assert_eq!(grouped[&VisitClass::Emergency].len(), 1);
}

#[test]
fn wrong_password_is_rejected() {
    let result = open_directory(
        fixture_path("chart"),
        CHART,
        Credentials::new("nurse01", "guess"),
        Duration::minutes(5),
    );
    assert!(matches!(result, Err(ChartError::AuthFailure(_))));
}

#[test]
fn html_report_is_written() {
    let mut chart = open_chart();
    let report = assemble_diffs(&mut chart, CHART, None, &ChartConfig::default()).unwrap();

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("19314023_diff.html");
    write_artifact(&HtmlSink, Artifact::Diffs(&report), "19314023 diff", &path).unwrap();

    let html = fs::read_to_string(path).unwrap();
    assert!(html.contains("<h2 id=\"author0\">Lin</h2>"));
    assert!(html.contains("upright position after feeds"));
    assert!(html.contains("Skipped notes"));
}

#[test]
fn blood_pressure_read_from_tpr_grid() {
    let mut chart = open_chart();
    let config = ChartConfig::default();

    let systolic =
        collect_history(&mut chart, ENCOUNTER, RecordKind::SystolicBp, &config, false).unwrap();
    let values: Vec<_> = systolic.iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["64", "60"]);

    let diastolic =
        collect_history(&mut chart, ENCOUNTER, RecordKind::DiastolicBp, &config, false).unwrap();
    assert_eq!(diastolic[1].value, "33");
}

#[test]
fn admission_assessment_is_read() {
    let mut chart = open_chart();
    let records = collect_history(
        &mut chart,
        ENCOUNTER,
        RecordKind::NursingAdmission,
        &ChartConfig::default(),
        false,
    )
    .unwrap();

    let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["bloodtype", "diagnosis", "height", "medication_allergies", "pid", "routine", "weight"]
    );
    let diagnosis = records.iter().find(|r| r.key == "diagnosis").unwrap();
    assert_eq!(diagnosis.value, "Preterm infant, GA 30 weeks\nRDS");
    assert_eq!(
        diagnosis.timestamp,
        NaiveDate::from_ymd_opt(2019, 7, 1)
            .unwrap()
            .and_hms_opt(10, 45, 0)
            .unwrap()
    );
}
