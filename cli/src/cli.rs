use std::path::PathBuf;

use chartwalk_emr::{OutputFormat, RecordKind};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chartwalk")]
#[command(version)]
#[command(about = "Extract dated history, first diagnoses and note changes from patient charts")]
pub struct Cli {
    /// JSON file overriding walk, diff and history settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every skipped line and page
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// First occurrence of every diagnosis on outpatient and inpatient notes
    Diagnoses {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Vital signs or handover history of one ICU stay
    Icu {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        stay: StayArgs,
        /// temp, hr, rr, sbp, dbp, surgery, respiration, cxr or vaccine
        #[arg(short, long, default_value = "temp")]
        kind: RecordKind,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Nursing log events of one stay
    Nursing {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        stay: StayArgs,
        /// Read the admission assessment instead of the daily log
        #[arg(long)]
        admission: bool,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Orders of one stay, by start time
    Orders {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        stay: StayArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Changes between consecutive outpatient notes of each physician
    Diff {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        range: RangeArgs,
        /// List each physician's changes newest first
        #[arg(long)]
        reverse: bool,
        /// Skip notes with fewer segments than this
        #[arg(long)]
        min_segments: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Visit ids on the chart, grouped by outpatient, inpatient and emergency
    Encounters {
        #[command(flatten)]
        chart: ChartArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ChartArgs {
    /// Operator account
    #[arg(short, long)]
    pub user: String,

    /// Operator password
    #[arg(short, long)]
    pub password: String,

    /// Chart number of the patient
    #[arg(short, long)]
    pub chart: String,

    /// Directory holding the chart snapshots
    #[arg(long, default_value = "charts")]
    pub root: PathBuf,

    /// Minutes a login stays valid before it is renewed (1 to 1440)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=1440))]
    pub session_minutes: u32,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First day of visits to include (YYYY-MM-DD)
    #[arg(long, default_value = "2019-01-01")]
    pub start: NaiveDate,

    /// Last day of visits to include; today when omitted
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct StayArgs {
    /// Encounter id of the stay
    #[arg(short, long)]
    pub encounter: String,

    /// Walk every page instead of only the latest one
    #[arg(short, long)]
    pub all_pages: bool,

    /// Drop records before this time (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
    #[arg(long, value_parser = parse_cutoff)]
    pub since: Option<NaiveDateTime>,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Directory the output file is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// csv, html or json
    #[arg(short, long, default_value = "csv")]
    pub format: OutputFormat,
}

fn parse_cutoff(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|day| day.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|err| format!("expected YYYY-MM-DD [HH:MM]: {err}"))
}
