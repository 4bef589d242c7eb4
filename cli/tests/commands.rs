use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn chart_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../chartwalk-emr/tests/data/chart")
}

fn chartwalk(args: &[&str], out: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chartwalk"))
        .args(args)
        .args(["-u", "nurse01", "-p", "nicu2019", "-c", "19314023"])
        .arg("--root")
        .arg(chart_root())
        .arg("--output-dir")
        .arg(out)
        .output()
        .expect("chartwalk runs")
}

#[test]
fn diagnoses_writes_named_csv() {
    let out = tempfile::tempdir().unwrap();
    let result = chartwalk(&["diagnoses", "--start", "2019-01-01", "--end", "2019-12-31"], out.path());
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let csv = fs::read_to_string(out.path().join("19314023_diag_2019-01-01_2019-12-31.csv")).unwrap();
    let rows: Vec<_> = csv.lines().collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1], "Acute bronchiolitis,2019-05-21 09:30:00,Lin,Acute bronchiolitis");
}

#[test]
fn icu_history_honours_cutoff() {
    let out = tempfile::tempdir().unwrap();
    let result = chartwalk(
        &["icu", "-e", "I20190014727", "--kind", "hr", "--all-pages", "--since", "2019-07-03", "-f", "json"],
        out.path(),
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json = fs::read_to_string(out.path().join("19314023_I20190014727_icu_hr.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&json).unwrap();
    let values: Vec<_> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(values, vec!["142", "150"]);
}

#[test]
fn diff_report_in_html() {
    let out = tempfile::tempdir().unwrap();
    let result = chartwalk(
        &["diff", "--start", "2019-01-01", "--end", "2019-12-31", "--reverse", "-f", "html"],
        out.path(),
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let html =
        fs::read_to_string(out.path().join("19314023_diff_2019-01-01_2019-12-31_rev.html")).unwrap();
    assert!(html.contains("O1080604002"));
    assert!(html.contains("diff_chg"));
}

#[test]
fn orders_rejected_on_icu_command() {
    let out = tempfile::tempdir().unwrap();
    let result = chartwalk(&["icu", "-e", "I20190014727", "--kind", "orders"], out.path());
    assert!(!result.status.success());
}

#[test]
fn wrong_password_fails_the_run() {
    let out = tempfile::tempdir().unwrap();
    let result = Command::new(env!("CARGO_BIN_EXE_chartwalk"))
        .args(["encounters", "-u", "nurse01", "-p", "guess", "-c", "19314023", "--root"])
        .arg(chart_root())
        .arg("--output-dir")
        .arg(out.path())
        .output()
        .unwrap();
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("authentication failed"));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn nursing_admission_writes_assessment() {
    let out = tempfile::tempdir().unwrap();
    let result = chartwalk(
        &["nursing", "-e", "I20190014727", "--admission", "-f", "json"],
        out.path(),
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let json =
        fs::read_to_string(out.path().join("19314023_I20190014727_nursing_adm.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&json).unwrap();
    let weight = records
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["key"] == "weight")
        .expect("weight recorded");
    assert_eq!(weight["value"], "1450 g");
}
