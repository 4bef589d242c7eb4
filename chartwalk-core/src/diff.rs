//! Segment-wise line diffs between consecutive notes of the same author.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AuthorGroup, ChartError, Delta, DiffConfig, Note, Segment};

/// One block of an edit script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOp {
    Equal { lines: Vec<String> },
    Insert { lines: Vec<String> },
    Delete { lines: Vec<String> },
    Replace { from: Vec<String>, to: Vec<String> },
}

/// Line-level edit script turning one text into another.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineDiff {
    pub ops: Vec<DiffOp>,
}

enum Edit<'a> {
    Keep(&'a str),
    Add(&'a str),
    Drop(&'a str),
}

impl LineDiff {
    /// Longest-common-subsequence alignment of `from` against `to`.
    pub fn between(from: &[String], to: &[String]) -> Self {
        let (n, m) = (from.len(), to.len());
        // lcs[i][j]: common subsequence length of from[i..] and to[j..]
        let mut lcs = vec![vec![0u32; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i][j] = if from[i] == to[j] {
                    lcs[i + 1][j + 1] + 1
                } else {
                    lcs[i + 1][j].max(lcs[i][j + 1])
                };
            }
        }

        let mut edits = Vec::with_capacity(n + m);
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if from[i] == to[j] {
                edits.push(Edit::Keep(&from[i]));
                i += 1;
                j += 1;
            } else if lcs[i + 1][j] >= lcs[i][j + 1] {
                edits.push(Edit::Drop(&from[i]));
                i += 1;
            } else {
                edits.push(Edit::Add(&to[j]));
                j += 1;
            }
        }
        edits.extend(from[i..].iter().map(|line| Edit::Drop(line)));
        edits.extend(to[j..].iter().map(|line| Edit::Add(line)));

        Self {
            ops: coalesce(edits),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, DiffOp::Equal { .. }))
    }

    /// Lines added and removed, counting both sides of a replacement.
    pub fn counts(&self) -> (usize, usize) {
        self.ops.iter().fold((0, 0), |(added, removed), op| match op {
            DiffOp::Equal { .. } => (added, removed),
            DiffOp::Insert { lines } => (added + lines.len(), removed),
            DiffOp::Delete { lines } => (added, removed + lines.len()),
            DiffOp::Replace { from, to } => (added + to.len(), removed + from.len()),
        })
    }

    /// Replay the script over `from`, checking every line it claims to keep
    /// or remove.
    pub fn apply(&self, from: &[String]) -> Result<Vec<String>, ChartError> {
        let mut out = Vec::with_capacity(from.len());
        let mut cursor = 0;

        for op in &self.ops {
            match op {
                DiffOp::Equal { lines } => {
                    consume(from, lines, &mut cursor)?;
                    out.extend(lines.iter().cloned());
                }
                DiffOp::Insert { lines } => out.extend(lines.iter().cloned()),
                DiffOp::Delete { lines } => consume(from, lines, &mut cursor)?,
                DiffOp::Replace { from: old, to } => {
                    consume(from, old, &mut cursor)?;
                    out.extend(to.iter().cloned());
                }
            }
        }

        if cursor != from.len() {
            return Err(ChartError::DiffMismatch(format!(
                "{} trailing line(s) not covered",
                from.len() - cursor
            )));
        }
        Ok(out)
    }
}

/// Advance `cursor` past `expected`, which must be the next lines of `from`.
fn consume(from: &[String], expected: &[String], cursor: &mut usize) -> Result<(), ChartError> {
    let end = *cursor + expected.len();
    match from.get(*cursor..end) {
        Some(actual) if actual == expected => {
            *cursor = end;
            Ok(())
        }
        _ => Err(ChartError::DiffMismatch(format!(
            "expected {} line(s) at line {}",
            expected.len(),
            *cursor + 1
        ))),
    }
}

fn coalesce(edits: Vec<Edit<'_>>) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    let mut added: Vec<String> = Vec::new();

    fn flush_changes(ops: &mut Vec<DiffOp>, dropped: &mut Vec<String>, added: &mut Vec<String>) {
        let from = std::mem::take(dropped);
        let to = std::mem::take(added);
        match (from.is_empty(), to.is_empty()) {
            (true, true) => {}
            (false, true) => ops.push(DiffOp::Delete { lines: from }),
            (true, false) => ops.push(DiffOp::Insert { lines: to }),
            (false, false) => ops.push(DiffOp::Replace { from, to }),
        }
    }

    for edit in edits {
        match edit {
            Edit::Keep(line) => {
                flush_changes(&mut ops, &mut dropped, &mut added);
                kept.push(line.to_string());
            }
            Edit::Drop(line) => {
                if !kept.is_empty() {
                    ops.push(DiffOp::Equal {
                        lines: std::mem::take(&mut kept),
                    });
                }
                dropped.push(line.to_string());
            }
            Edit::Add(line) => {
                if !kept.is_empty() {
                    ops.push(DiffOp::Equal {
                        lines: std::mem::take(&mut kept),
                    });
                }
                added.push(line.to_string());
            }
        }
    }

    flush_changes(&mut ops, &mut dropped, &mut added);
    if !kept.is_empty() {
        ops.push(DiffOp::Equal { lines: kept });
    }
    ops
}

/// A note left out of the diff, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedNote {
    pub author: String,
    pub id: String,
    pub present: usize,
    pub required: usize,
}

/// Deltas in output order plus the notes that could not take part.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiffReport {
    pub deltas: Vec<Delta>,
    pub skipped: Vec<SkippedNote>,
}

/// Bucket notes by author, in order of each author's first appearance.
///
/// Within a bucket notes are sorted by timestamp; equal timestamps keep their
/// input order and repeated note ids are dropped.
pub fn group_by_author<I>(notes: I) -> Vec<AuthorGroup>
where
    I: IntoIterator<Item = Note>,
{
    let mut groups: Vec<AuthorGroup> = Vec::new();
    let mut slot_of: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for note in notes {
        if !seen.insert((note.author.clone(), note.id.clone())) {
            continue;
        }
        let slot = *slot_of.entry(note.author.clone()).or_insert_with(|| {
            groups.push(AuthorGroup {
                author: note.author.clone(),
                notes: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].notes.push(note);
    }

    for group in &mut groups {
        group.notes.sort_by_key(|note| note.timestamp);
    }
    groups
}

fn check_complete(note: &Note, required: usize) -> Result<(), ChartError> {
    let present = note.present_segments();
    if present < required {
        return Err(ChartError::IncompleteDocument {
            id: note.id.clone(),
            present,
            required,
        });
    }
    Ok(())
}

/// Diff every segment of two notes, in display order.
pub fn diff_notes(from: &Note, to: &Note) -> Delta {
    let segments: BTreeMap<Segment, LineDiff> = Segment::DISPLAY_ORDER
        .iter()
        .map(|&segment| {
            (
                segment,
                LineDiff::between(from.lines(segment), to.lines(segment)),
            )
        })
        .collect();

    Delta {
        author: to.author.clone(),
        from_id: from.id.clone(),
        to_id: to.id.clone(),
        from_timestamp: from.timestamp,
        to_timestamp: to.timestamp,
        segments,
    }
}

/// Produce one delta per consecutive pair of complete notes per author.
///
/// Incomplete notes are reported in `skipped` and never become a baseline.
pub fn assemble(groups: &[AuthorGroup], config: &DiffConfig) -> DiffReport {
    let mut report = DiffReport::default();

    for group in groups {
        let mut baseline: Option<&Note> = None;
        let mut deltas = Vec::new();

        for note in &group.notes {
            if let Err(err) = check_complete(note, config.min_segments) {
                debug!(author = %group.author, "skipping note: {err}");
                report.skipped.push(SkippedNote {
                    author: group.author.clone(),
                    id: note.id.clone(),
                    present: note.present_segments(),
                    required: config.min_segments,
                });
                continue;
            }
            if let Some(previous) = baseline {
                deltas.push(diff_notes(previous, note));
            }
            baseline = Some(note);
        }

        if config.reverse {
            deltas.reverse();
        }
        report.deltas.extend(deltas);
    }

    report
}
