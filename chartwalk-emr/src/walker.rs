//! Lazy traversal of a sheet's pages, most recent first.

use chartwalk_core::{ChartError, PageLocator, Sheet, WalkConfig};
use tracing::{debug, warn};

use crate::{Document, DocumentFetcher};

/// Iterator over the pages of one sheet for one encounter.
///
/// A failed fetch is yielded as `Err` without moving on, so calling `next`
/// again retries the same page.
pub struct PageWalk<F> {
    fetcher: F,
    next: Option<PageLocator>,
    stride: u32,
    max_steps: Option<usize>,
    yielded: usize,
}

/// Start a walk at the most recent page of `sheet`.
pub fn walk<F: DocumentFetcher>(
    fetcher: F,
    sheet: Sheet,
    encounter: &str,
    config: &WalkConfig,
) -> PageWalk<F> {
    PageWalk {
        fetcher,
        next: Some(PageLocator::first(sheet, encounter)),
        stride: config.stride.unwrap_or_else(|| sheet.default_stride()),
        max_steps: config.max_steps,
        yielded: 0,
    }
}

impl<F> PageWalk<F> {
    /// Page the next call to `next` will fetch.
    pub fn pending(&self) -> Option<&PageLocator> {
        self.next.as_ref()
    }

    pub fn pages_yielded(&self) -> usize {
        self.yielded
    }
}

impl<F: DocumentFetcher> Iterator for PageWalk<F> {
    type Item = Result<Document, ChartError>;

    fn next(&mut self) -> Option<Self::Item> {
        let locator = self.next.as_ref()?;
        if self.max_steps.is_some_and(|max| self.yielded >= max) {
            debug!(%locator, steps = self.yielded, "step limit reached");
            self.next = None;
            return None;
        }

        match self.fetcher.fetch(locator) {
            Ok(Some(document)) => {
                let following = locator.advance(self.stride);
                self.next = document.links_to(&following).then_some(following);
                self.yielded += 1;
                Some(Ok(document))
            }
            Ok(None) => {
                debug!(%locator, "page not found, walk finished");
                self.next = None;
                None
            }
            Err(err) => {
                warn!(%locator, error = %err, "page fetch failed");
                Some(Err(err))
            }
        }
    }
}
