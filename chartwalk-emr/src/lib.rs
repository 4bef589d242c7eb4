//! Chart backend access: authenticated page retrieval, pagination, record
//! extraction and rendering of the results.

pub mod document;
pub mod extract;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod visits;
pub mod walker;

pub use document::{Document, Field, Table};
pub use extract::{admission_timestamp, extract, ExtractContext, RecordKind, ADMISSION_FIELD};
pub use pipeline::{
    assemble_diffs, collect_diagnoses, collect_history, collect_notes, collect_pages, fetch_page,
    list_visits, since,
};
pub use sink::{
    output_name, write_artifact, Artifact, CsvSink, HtmlSink, JsonSink, OutputFormat, Sink,
};
pub use source::{
    open_directory, page_path, AuthContext, Credentials, DirectoryFetcher, DirectorySession,
    DocumentFetcher, ReauthFetcher, Session,
};
pub use visits::{
    encounter_ids, note_from_document, select_visits, visits_from_document, DateRange,
    VisitClass, VisitEntry,
};
pub use walker::{walk, PageWalk};
