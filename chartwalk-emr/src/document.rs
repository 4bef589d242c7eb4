//! Parsed page structure as handed over by a [`DocumentFetcher`](crate::DocumentFetcher).

use chartwalk_core::PageLocator;
use serde::{Deserialize, Serialize};

/// One fetched page, already reduced to labelled blocks, tables and links.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Document {
    /// Banner line of the page; visit pages carry their timestamp here.
    pub header: Option<String>,
    /// Responsible author (attending physician) when the page names one.
    pub author: Option<String>,
    /// Day covered by the page, for sheets split per day.
    pub date: Option<String>,
    pub fields: Vec<Field>,
    pub tables: Vec<Table>,
    pub links: Vec<String>,
}

/// A labelled block of text lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub label: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

/// A table as a list of rows of cell text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Document {
    /// First field whose label contains `label`.
    pub fn field(&self, label: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.label.contains(label))
    }

    /// Field whose label equals `label`, ignoring case and surrounding space.
    pub fn field_exact(&self, label: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.label.trim().eq_ignore_ascii_case(label))
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Whether the page links to `locator`, i.e. an earlier page exists.
    pub fn links_to(&self, locator: &PageLocator) -> bool {
        self.links.iter().any(|href| locator.is_link_to(href))
    }
}

impl Field {
    /// Non-empty lines with surrounding whitespace removed.
    pub fn stripped_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
    }
}

impl Table {
    /// First row whose leading cell contains `label`.
    pub fn row(&self, label: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row.first().is_some_and(|cell| cell.contains(label)))
            .map(Vec::as_slice)
    }
}

/// Cell text at `index`, trimmed; `None` when absent or blank.
pub(crate) fn cell(row: &[String], index: usize) -> Option<&str> {
    row.get(index)
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
}
