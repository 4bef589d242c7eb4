//! End-to-end runs: walk the chart, extract records, reduce or diff them.

use std::collections::BTreeSet;
use std::thread;

use chartwalk_core::{
    assemble, group_by_author, ChartConfig, ChartError, DiffReport, Note, PageLocator, Record,
    ReducedIndex, SharedReducer, Sheet, WalkConfig,
};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::{
    admission_timestamp, extract, note_from_document, select_visits, visits_from_document, walk,
    DateRange, Document, DocumentFetcher, ExtractContext, RecordKind, VisitClass, VisitEntry,
};

/// Fetch one page, retrying transient failures up to `retries` extra times.
pub fn fetch_page<F: DocumentFetcher>(
    fetcher: &mut F,
    locator: &PageLocator,
    retries: u32,
) -> Result<Option<Document>, ChartError> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(locator) {
            Err(err @ ChartError::FetchFailure { .. }) if attempt < retries => {
                attempt += 1;
                warn!(%locator, attempt, error = %err, "retrying page");
            }
            other => return other,
        }
    }
}

/// Pages of one sheet, most recent first. Only the first page unless `all_pages`.
pub fn collect_pages<F: DocumentFetcher>(
    fetcher: &mut F,
    sheet: Sheet,
    encounter: &str,
    config: &WalkConfig,
    all_pages: bool,
) -> Result<Vec<Document>, ChartError> {
    let mut pages = walk(fetcher, sheet, encounter, config);
    let mut documents = Vec::new();
    let mut attempt = 0;

    while let Some(result) = pages.next() {
        match result {
            Ok(document) => {
                attempt = 0;
                documents.push(document);
                if !all_pages {
                    break;
                }
            }
            Err(ChartError::FetchFailure { .. }) if attempt < config.retries => attempt += 1,
            Err(err) => return Err(err),
        }
    }

    debug!(%sheet, encounter, pages = documents.len(), "walk collected");
    Ok(documents)
}

/// All visits on the chart's visit list.
pub fn list_visits<F: DocumentFetcher>(
    fetcher: &mut F,
    chart: &str,
    config: &ChartConfig,
) -> Result<Vec<VisitEntry>, ChartError> {
    let locator = PageLocator::first(Sheet::VisitList, chart);
    let document =
        fetch_page(fetcher, &locator, config.walk.retries)?.ok_or_else(|| {
            ChartError::FetchFailure {
                locator: locator.to_string(),
                reason: "visit list not found".into(),
            }
        })?;
    let visits = visits_from_document(&document);
    info!(chart, visits = visits.len(), "visit list read");
    Ok(visits)
}

/// Visit pages for the selected visits, skipping visits without a page.
fn visit_pages<'a, F: DocumentFetcher>(
    fetcher: &mut F,
    visits: Vec<&'a VisitEntry>,
    config: &ChartConfig,
) -> Result<Vec<(&'a VisitEntry, Document)>, ChartError> {
    let mut pages = Vec::with_capacity(visits.len());
    for visit in visits {
        let locator = PageLocator::first(Sheet::VisitNote, visit.id.as_str());
        match fetch_page(fetcher, &locator, config.walk.retries)? {
            Some(document) => pages.push((visit, document)),
            None => debug!(visit = %visit.id, "visit has no note"),
        }
    }
    Ok(pages)
}

/// Earliest diagnosis of every problem on outpatient and inpatient notes.
///
/// Pages are fetched in order and then split across worker threads that
/// feed one shared reducer.
pub fn collect_diagnoses<F: DocumentFetcher>(
    fetcher: &mut F,
    chart: &str,
    range: Option<&DateRange>,
    config: &ChartConfig,
) -> Result<ReducedIndex, ChartError> {
    let visits = list_visits(fetcher, chart, config)?;
    let selected = select_visits(
        &visits,
        &[VisitClass::Outpatient, VisitClass::Inpatient],
        range,
    );
    let pages = visit_pages(fetcher, selected, config)?;

    let reducer = SharedReducer::new();
    let context = ExtractContext::new(&config.history);
    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    let chunk = pages.len().div_ceil(workers).max(1);

    thread::scope(|scope| {
        for batch in pages.chunks(chunk) {
            let reducer = &reducer;
            let context = &context;
            scope.spawn(move || {
                for (visit, document) in batch {
                    match extract(document, RecordKind::Diagnosis, context) {
                        Ok(records) => reducer.offer_all(records),
                        Err(err) => debug!(visit = %visit.id, error = %err, "skipping note"),
                    }
                }
            });
        }
    });

    let index = reducer.finish();
    info!(chart, diagnoses = index.len(), "diagnoses reduced");
    Ok(index)
}

/// Outpatient notes in the range, as written.
pub fn collect_notes<F: DocumentFetcher>(
    fetcher: &mut F,
    chart: &str,
    range: Option<&DateRange>,
    config: &ChartConfig,
) -> Result<Vec<Note>, ChartError> {
    let visits = list_visits(fetcher, chart, config)?;
    let selected = select_visits(&visits, &[VisitClass::Outpatient], range);
    let pages = visit_pages(fetcher, selected, config)?;

    let mut notes = Vec::with_capacity(pages.len());
    for (visit, document) in &pages {
        match note_from_document(visit, document) {
            Ok(note) => notes.push(note),
            Err(err) => debug!(visit = %visit.id, error = %err, "skipping note"),
        }
    }
    Ok(notes)
}

/// Per-author deltas between consecutive outpatient notes.
pub fn assemble_diffs<F: DocumentFetcher>(
    fetcher: &mut F,
    chart: &str,
    range: Option<&DateRange>,
    config: &ChartConfig,
) -> Result<DiffReport, ChartError> {
    let notes = collect_notes(fetcher, chart, range, config)?;
    let groups = group_by_author(notes);
    let report = assemble(&groups, &config.diff);
    info!(
        chart,
        authors = groups.len(),
        deltas = report.deltas.len(),
        skipped = report.skipped.len(),
        "notes compared"
    );
    Ok(report)
}

/// Records of one kind for an encounter, oldest first.
///
/// Every row of a page is kept. When pages overlap, a `(timestamp, key)` slot
/// already filled by a more recent page is not read again from an older one.
pub fn collect_history<F: DocumentFetcher>(
    fetcher: &mut F,
    encounter: &str,
    kind: RecordKind,
    config: &ChartConfig,
    all_pages: bool,
) -> Result<Vec<Record>, ChartError> {
    if kind == RecordKind::Diagnosis {
        return Err(ChartError::Config(
            "diagnoses are collected per chart, not per encounter".into(),
        ));
    }

    let mut context = ExtractContext::new(&config.history);
    if kind.is_free_text() {
        let locator = PageLocator::first(Sheet::BasicInfo, encounter);
        let admission = fetch_page(fetcher, &locator, config.walk.retries)?
            .as_ref()
            .and_then(admission_timestamp);
        debug!(encounter, ?admission, "admission read");
        context = context.with_admission(admission);
    }

    let pages = collect_pages(fetcher, kind.sheet(), encounter, &config.walk, all_pages)?;
    let mut covered: BTreeSet<(NaiveDateTime, String)> = BTreeSet::new();
    let mut records: Vec<Record> = Vec::new();
    for document in &pages {
        let page: Vec<Record> = extract(document, kind, &context)?
            .into_iter()
            .filter(|record| !covered.contains(&(record.timestamp, record.key.clone())))
            .collect();
        covered.extend(page.iter().map(|record| (record.timestamp, record.key.clone())));
        records.extend(page);
    }
    records.sort_by(|a, b| (a.timestamp, &a.key).cmp(&(b.timestamp, &b.key)));

    info!(encounter, %kind, records = records.len(), "history extracted");
    Ok(records)
}

/// Records at or after `cutoff`; all records when there is none.
pub fn since(records: Vec<Record>, cutoff: Option<NaiveDateTime>) -> Vec<Record> {
    match cutoff {
        Some(cutoff) => records
            .into_iter()
            .filter(|record| record.timestamp >= cutoff)
            .collect(),
        None => records,
    }
}
