//! Query context merged into outgoing list requests.

use crate::executor::Request;

/// Namespace plus pagination state for one list view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Namespace the request is scoped to; empty means root.
    pub namespace: String,
    /// 1-based page, when paginating.
    pub page: Option<usize>,
    /// Id filter, when filtering.
    pub page_filter: Option<String>,
}

impl QueryContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.page_filter = (!filter.is_empty()).then_some(filter);
        self
    }

    /// Pagination parameters as query pairs (`page`, `pageFilter`).
    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(page) = self.page {
            params.push(("page".to_owned(), page.to_string()));
        }
        if let Some(filter) = &self.page_filter {
            params.push(("pageFilter".to_owned(), filter.clone()));
        }
        params
    }

    /// Merge pagination parameters into a list request. Other requests are
    /// returned unchanged; parameters already present are not duplicated.
    #[must_use]
    pub fn apply(&self, mut request: Request) -> Request {
        if !request.is_list() {
            return request;
        }
        for (key, value) in self.query_params() {
            if request.query_value(&key).is_none() {
                request.query.push((key, value));
            }
        }
        request
    }
}
