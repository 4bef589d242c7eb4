//! Text renderings of reduced indexes, timelines, note diffs and encounter lists.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chartwalk_core::{ChartError, Delta, DiffOp, DiffReport, Record, ReducedIndex, Segment};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::VisitClass;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Html,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }

    pub fn sink(self) -> Box<dyn Sink> {
        match self {
            OutputFormat::Csv => Box::new(CsvSink),
            OutputFormat::Html => Box::new(HtmlSink),
            OutputFormat::Json => Box::new(JsonSink),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "html" => Ok(OutputFormat::Html),
            "json" => Ok(OutputFormat::Json),
            other => Err(ChartError::Config(format!("unknown output format {other:?}"))),
        }
    }
}

/// Anything a run can produce.
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    Index(&'a ReducedIndex),
    Timeline(&'a [Record]),
    Diffs(&'a DiffReport),
    Encounters(&'a BTreeMap<VisitClass, BTreeSet<String>>),
}

pub trait Sink {
    fn write(&self, artifact: Artifact<'_>, title: &str, out: &mut dyn Write)
        -> Result<(), ChartError>;
}

/// Write `artifact` to `path`, creating parent directories as needed.
pub fn write_artifact(
    sink: &dyn Sink,
    artifact: Artifact<'_>,
    title: &str,
    path: &Path,
) -> Result<(), ChartError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    sink.write(artifact, title, &mut out)?;
    out.flush()?;
    info!(path = %path.display(), "output written");
    Ok(())
}

/// `{part}_{part}..._{part}.{ext}`, skipping empty parts.
pub fn output_name(parts: &[&str], format: OutputFormat) -> String {
    let stem: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    format!("{}.{}", stem.join("_"), format.extension())
}

fn timestamp(value: NaiveDateTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

fn op_name(op: &DiffOp) -> &'static str {
    match op {
        DiffOp::Equal { .. } => "equal",
        DiffOp::Insert { .. } => "insert",
        DiffOp::Delete { .. } => "delete",
        DiffOp::Replace { .. } => "replace",
    }
}

/// Lines on each side of an edit block.
fn op_sides(op: &DiffOp) -> (&[String], &[String]) {
    const NONE: &[String] = &[];
    match op {
        DiffOp::Equal { lines } => (lines.as_slice(), lines.as_slice()),
        DiffOp::Insert { lines } => (NONE, lines.as_slice()),
        DiffOp::Delete { lines } => (lines.as_slice(), NONE),
        DiffOp::Replace { from, to } => (from.as_slice(), to.as_slice()),
    }
}

fn segments_in_order(delta: &Delta) -> impl Iterator<Item = (Segment, &chartwalk_core::LineDiff)> {
    Segment::DISPLAY_ORDER
        .into_iter()
        .filter_map(|segment| delta.segments.get(&segment).map(|diff| (segment, diff)))
}

pub struct CsvSink;

/// Quote a field when it holds a separator, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(out: &mut dyn Write, cells: &[&str]) -> io::Result<()> {
    let line: Vec<String> = cells.iter().map(|cell| csv_field(cell)).collect();
    writeln!(out, "{}", line.join(","))
}

/// Delta columns followed by segment, change and the two sides of one block.
fn diff_row<'a>(head: &[&'a str; 5], tail: [&'a str; 4]) -> Vec<&'a str> {
    head.iter().copied().chain(tail).collect()
}

impl Sink for CsvSink {
    fn write(
        &self,
        artifact: Artifact<'_>,
        _title: &str,
        out: &mut dyn Write,
    ) -> Result<(), ChartError> {
        match artifact {
            Artifact::Index(index) => {
                csv_row(out, &["Key", "First seen", "Author", "Value"])?;
                for (key, entry) in index.chronological() {
                    let when = timestamp(entry.timestamp);
                    let author = entry.author.as_deref().unwrap_or_default();
                    csv_row(out, &[key, &when, author, &entry.value])?;
                }
            }
            Artifact::Timeline(records) => {
                csv_row(out, &["Time", "Key", "Author", "Value"])?;
                for record in records {
                    let when = timestamp(record.timestamp);
                    let author = record.author.as_deref().unwrap_or_default();
                    csv_row(out, &[&when, &record.key, author, &record.value])?;
                }
            }
            Artifact::Diffs(report) => {
                csv_row(
                    out,
                    &[
                        "Author", "From visit", "To visit", "From", "To", "Segment", "Change",
                        "Removed", "Added",
                    ],
                )?;
                for delta in &report.deltas {
                    let from = timestamp(delta.from_timestamp);
                    let to = timestamp(delta.to_timestamp);
                    let head: [&str; 5] = [
                        delta.author.as_str(),
                        delta.from_id.as_str(),
                        delta.to_id.as_str(),
                        from.as_str(),
                        to.as_str(),
                    ];
                    if delta.segments.is_empty() {
                        csv_row(out, &diff_row(&head, ["", "none", "", ""]))?;
                    }
                    for (segment, diff) in segments_in_order(delta) {
                        if diff.ops.is_empty() {
                            csv_row(out, &diff_row(&head, [segment.title(), "none", "", ""]))?;
                        }
                        for op in &diff.ops {
                            let (removed, added) = op_sides(op);
                            let (removed, added) = (removed.join("\n"), added.join("\n"));
                            csv_row(
                                out,
                                &diff_row(&head, [segment.title(), op_name(op), &removed, &added]),
                            )?;
                        }
                    }
                }
                if !report.skipped.is_empty() {
                    writeln!(out)?;
                    csv_row(out, &["Author", "Skipped visit", "Segments", "Required"])?;
                    for note in &report.skipped {
                        let (present, required) =
                            (note.present.to_string(), note.required.to_string());
                        csv_row(out, &[&note.author, &note.id, &present, &required])?;
                    }
                }
            }
            Artifact::Encounters(groups) => {
                csv_row(out, &["Class", "Encounter"])?;
                for (class, ids) in groups {
                    let class = class.to_string();
                    for id in ids {
                        csv_row(out, &[&class, id])?;
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct HtmlSink;

pub fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const STYLE: &str = "table{border-collapse:collapse}td,th{border:1px solid #999;padding:2px 6px;vertical-align:top}\
.diff_add{background:#aaffaa}.diff_chg{background:#ffff77}.diff_sub{background:#ffaaaa}";

fn html_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| html_escape(line))
        .collect::<Vec<_>>()
        .join("<br>")
}

fn html_table(out: &mut dyn Write, header: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
    writeln!(out, "<table>")?;
    write!(out, "<tr>")?;
    for cell in header {
        write!(out, "<th>{}</th>", html_escape(cell))?;
    }
    writeln!(out, "</tr>")?;
    for row in rows {
        write!(out, "<tr>")?;
        for cell in row {
            write!(out, "<td>{}</td>", html_escape(cell))?;
        }
        writeln!(out, "</tr>")?;
    }
    writeln!(out, "</table>")
}

fn html_delta(out: &mut dyn Write, delta: &Delta) -> io::Result<()> {
    writeln!(
        out,
        "<h3>{} ({}) &rarr; {} ({})</h3>",
        timestamp(delta.from_timestamp),
        html_escape(&delta.from_id),
        timestamp(delta.to_timestamp),
        html_escape(&delta.to_id),
    )?;
    for (segment, diff) in segments_in_order(delta) {
        writeln!(out, "<h4>{}</h4>", html_escape(segment.title()))?;
        writeln!(out, "<table>")?;
        for op in &diff.ops {
            let class = match op {
                DiffOp::Equal { .. } => "",
                DiffOp::Insert { .. } => "diff_add",
                DiffOp::Delete { .. } => "diff_sub",
                DiffOp::Replace { .. } => "diff_chg",
            };
            let (removed, added) = op_sides(op);
            writeln!(
                out,
                "<tr class=\"{class}\"><td>{}</td><td>{}</td></tr>",
                html_lines(removed),
                html_lines(added),
            )?;
        }
        writeln!(out, "</table>")?;
    }
    Ok(())
}

impl Sink for HtmlSink {
    fn write(
        &self,
        artifact: Artifact<'_>,
        title: &str,
        out: &mut dyn Write,
    ) -> Result<(), ChartError> {
        let title = html_escape(title);
        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(
            out,
            "<html><head><meta charset=\"utf-8\"><title>{title}</title><style>{STYLE}</style></head><body>"
        )?;
        writeln!(out, "<h1>{title}</h1>")?;

        match artifact {
            Artifact::Index(index) => {
                let rows: Vec<Vec<String>> = index
                    .chronological()
                    .into_iter()
                    .map(|(key, entry)| {
                        vec![
                            key.to_string(),
                            timestamp(entry.timestamp),
                            entry.author.clone().unwrap_or_default(),
                            entry.value.clone(),
                        ]
                    })
                    .collect();
                html_table(out, &["Key", "First seen", "Author", "Value"], &rows)?;
            }
            Artifact::Timeline(records) => {
                let rows: Vec<Vec<String>> = records
                    .iter()
                    .map(|record| {
                        vec![
                            timestamp(record.timestamp),
                            record.key.clone(),
                            record.author.clone().unwrap_or_default(),
                            record.value.clone(),
                        ]
                    })
                    .collect();
                html_table(out, &["Time", "Key", "Author", "Value"], &rows)?;
            }
            Artifact::Diffs(report) => {
                let mut authors: Vec<&str> = Vec::new();
                for delta in &report.deltas {
                    if !authors.contains(&delta.author.as_str()) {
                        authors.push(&delta.author);
                    }
                }
                writeln!(out, "<ul>")?;
                for (n, author) in authors.iter().enumerate() {
                    writeln!(out, "<li><a href=\"#author{n}\">{}</a></li>", html_escape(author))?;
                }
                writeln!(out, "</ul>")?;
                for (n, author) in authors.iter().enumerate() {
                    writeln!(out, "<h2 id=\"author{n}\">{}</h2>", html_escape(author))?;
                    for delta in report.deltas.iter().filter(|d| d.author == *author) {
                        html_delta(out, delta)?;
                    }
                }
                if !report.skipped.is_empty() {
                    writeln!(out, "<h2>Skipped notes</h2>")?;
                    let rows: Vec<Vec<String>> = report
                        .skipped
                        .iter()
                        .map(|note| {
                            vec![
                                note.author.clone(),
                                note.id.clone(),
                                format!("{}/{}", note.present, note.required),
                            ]
                        })
                        .collect();
                    html_table(out, &["Author", "Visit", "Segments"], &rows)?;
                }
            }
            Artifact::Encounters(groups) => {
                for (class, ids) in groups {
                    writeln!(out, "<h2>{class}</h2><ul>")?;
                    for id in ids {
                        writeln!(out, "<li>{}</li>", html_escape(id))?;
                    }
                    writeln!(out, "</ul>")?;
                }
            }
        }

        writeln!(out, "</body></html>")?;
        Ok(())
    }
}

pub struct JsonSink;

impl Sink for JsonSink {
    fn write(
        &self,
        artifact: Artifact<'_>,
        _title: &str,
        out: &mut dyn Write,
    ) -> Result<(), ChartError> {
        let result = match artifact {
            Artifact::Index(index) => serde_json::to_writer_pretty(&mut *out, index),
            Artifact::Timeline(records) => serde_json::to_writer_pretty(&mut *out, records),
            Artifact::Diffs(report) => serde_json::to_writer_pretty(&mut *out, report),
            Artifact::Encounters(groups) => serde_json::to_writer_pretty(&mut *out, groups),
        };
        result.map_err(io::Error::from)?;
        writeln!(out)?;
        Ok(())
    }
}
