//! Route capabilities: pagination and discarding unsaved records on exit.
//!
//! Routes opt in by implementing the traits they need; [`ListRoute`] is the
//! stock list view and implements both.

use serde::Serialize;

use crate::query::QueryContext;
use crate::record::Record;
use crate::store::RecordStore;

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Pagination summary for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub current_page: usize,
    pub last_page: usize,
    pub next_page: Option<usize>,
    pub prev_page: Option<usize>,
    pub total: usize,
    pub filtered_total: usize,
    pub page_size: usize,
}

/// One page of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    pub meta: PageMeta,
}

/// A route whose model depends on `page` and `pageFilter`.
pub trait Paginated {
    fn page(&self) -> usize;

    fn page_filter(&self) -> Option<&str>;

    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// Update the query. Returns `true` when the model must be re-fetched.
    fn set_query(&mut self, page: usize, filter: Option<&str>) -> bool;

    /// Slice `records` down to the current page.
    ///
    /// The filter is a case-insensitive substring match on the id. Pages
    /// past the end clamp to the last page; page 0 is treated as page 1.
    fn paginate(&self, records: &[Record]) -> Page {
        let size = self.page_size().max(1);
        let needle = self.page_filter().map(str::to_lowercase);
        let filtered: Vec<&Record> = records
            .iter()
            .filter(|r| {
                needle
                    .as_deref()
                    .is_none_or(|needle| r.id.to_lowercase().contains(needle))
            })
            .collect();

        let filtered_total = filtered.len();
        let last_page = filtered_total.div_ceil(size).max(1);
        let current_page = self.page().clamp(1, last_page);
        let start = (current_page - 1).saturating_mul(size);

        Page {
            records: filtered
                .into_iter()
                .skip(start)
                .take(size)
                .cloned()
                .collect(),
            meta: PageMeta {
                current_page,
                last_page,
                next_page: (current_page < last_page).then(|| current_page + 1),
                prev_page: (current_page > 1).then(|| current_page - 1),
                total: records.len(),
                filtered_total,
                page_size: size,
            },
        }
    }
}

/// A route that drops never-saved records of its kind when left.
#[async_trait::async_trait]
pub trait DiscardsOnExit {
    /// Kind whose pending records are discarded.
    fn discard_kind(&self) -> &str;

    /// Called on route exit. Returns the discarded records.
    async fn on_exit(&self, store: &RecordStore) -> Vec<Record> {
        store.discard_unsaved(self.discard_kind()).await
    }
}

/// Stock list route for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRoute {
    kind: String,
    page: usize,
    page_filter: Option<String>,
    page_size: usize,
}

impl ListRoute {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            page: 1,
            page_filter: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Query context for fetching this route's model.
    #[must_use]
    pub fn query_context(&self, namespace: &str) -> QueryContext {
        let ctx = QueryContext::new(namespace).with_page(self.page);
        match &self.page_filter {
            Some(filter) => ctx.with_filter(filter.as_str()),
            None => ctx,
        }
    }
}

impl Paginated for ListRoute {
    fn page(&self) -> usize {
        self.page
    }

    fn page_filter(&self) -> Option<&str> {
        self.page_filter.as_deref()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn set_query(&mut self, page: usize, filter: Option<&str>) -> bool {
        let page = page.max(1);
        let filter = filter.filter(|f| !f.is_empty()).map(str::to_owned);
        let changed = page != self.page || filter != self.page_filter;
        self.page = page;
        self.page_filter = filter;
        changed
    }
}

impl DiscardsOnExit for ListRoute {
    fn discard_kind(&self) -> &str {
        &self.kind
    }
}
