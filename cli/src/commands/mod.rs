pub mod diagnoses;
pub mod diff;
pub mod encounters;
pub mod history;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chartwalk_core::ChartConfig;
use chartwalk_emr::{
    open_directory, output_name, write_artifact, Artifact, Credentials, DateRange,
    DocumentFetcher,
};
use chrono::{Duration, Local};

use crate::cli::{ChartArgs, OutputArgs, RangeArgs};

/// Defaults, overridden by a JSON config file when one is given.
pub fn load_config(path: Option<&Path>) -> Result<ChartConfig> {
    let Some(path) = path else {
        return Ok(ChartConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Log in to the chart and return a fetcher that renews the session itself.
pub fn connect(args: &ChartArgs) -> Result<impl DocumentFetcher + use<'_>> {
    open_directory(
        &args.root,
        &args.chart,
        Credentials::new(&args.user, &args.password),
        Duration::minutes(i64::from(args.session_minutes)),
    )
    .with_context(|| format!("could not open chart {}", args.chart))
}

pub fn date_range(args: &RangeArgs) -> Result<DateRange> {
    let end = args.end.unwrap_or_else(|| Local::now().date_naive());
    Ok(DateRange::new(args.start, end)?)
}

/// Range as it appears in output names.
pub fn range_parts(range: &DateRange) -> [String; 2] {
    [range.start.to_string(), range.end.to_string()]
}

/// Render `artifact` into the output directory and report where it went.
pub fn emit(output: &OutputArgs, parts: &[&str], title: &str, artifact: Artifact<'_>) -> Result<PathBuf> {
    let path = output
        .output_dir
        .join(output_name(parts, output.format));
    let sink = output.format.sink();
    write_artifact(sink.as_ref(), artifact, title, &path)
        .with_context(|| format!("could not write {}", path.display()))?;
    println!("{}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chartwalk.json");
        std::fs::write(&path, r#"{"walk": {"max_steps": 5}, "history": {"separator": " / "}}"#)
            .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.walk.max_steps, Some(5));
        assert_eq!(config.history.separator, " / ");
        assert_eq!(config.diff.min_segments, 4);
        assert_eq!(load_config(None).unwrap(), ChartConfig::default());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("absent.json").as_path())).is_err());
    }
}
