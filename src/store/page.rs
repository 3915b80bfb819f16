//! Query requests and the result pages they produce.

use super::StoreError;
use crate::index_db::QueryOutcome;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum QueryMode {
    Search { query: String },
    Latest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryRequest {
    #[serde(flatten)]
    pub mode: QueryMode,
    #[serde(default)]
    pub page_index: usize,
}

impl QueryRequest {
    pub fn search(query: impl Into<String>, page_index: usize) -> Self {
        Self {
            mode: QueryMode::Search {
                query: query.into(),
            },
            page_index,
        }
    }

    pub fn latest(page_index: usize) -> Self {
        Self {
            mode: QueryMode::Latest,
            page_index,
        }
    }
}

/// Storage window for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: usize,
    pub offset: usize,
}

impl PageWindow {
    pub fn for_page(page_size: NonZeroUsize, page_index: usize) -> Result<Self, StoreError> {
        let offset =
            page_size
                .get()
                .checked_mul(page_index)
                .ok_or(StoreError::PageOutOfRange {
                    page_index,
                    page_size: page_size.get(),
                })?;
        Ok(Self {
            limit: page_size.get(),
            offset,
        })
    }
}

/// Number of pages needed to show `total_count` items.
pub fn page_count(total_count: u64, page_size: NonZeroUsize) -> u64 {
    total_count.div_ceil(page_size.get() as u64)
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage<R> {
    pub items: Vec<R>,
    pub total_count: u64,
    pub page_count: u64,
}

impl<R> ResultPage<R> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            page_count: 0,
        }
    }

    pub fn from_outcome(outcome: QueryOutcome<R>, page_size: NonZeroUsize) -> Self {
        Self {
            page_count: page_count(outcome.total, page_size),
            total_count: outcome.total,
            items: outcome.data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.total_count == 0
    }
}

impl<R> Default for ResultPage<R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Observable page together with the sequence number of the request that
/// produced it. Sequence 0 is the initial empty page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState<R> {
    pub page: ResultPage<R>,
    pub seq: u64,
}

impl<R> Default for PageState<R> {
    fn default() -> Self {
        Self {
            page: ResultPage::empty(),
            seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_window_is_page_size_times_index() {
        for page_size in [1, 7, 10, 50] {
            for page_index in [0, 1, 2, 13] {
                let window = PageWindow::for_page(size(page_size), page_index).unwrap();
                assert_eq!(window.limit, page_size);
                assert_eq!(window.offset, page_size * page_index);
            }
        }
    }

    #[test]
    fn test_window_overflow_is_out_of_range() {
        let result = PageWindow::for_page(size(10), usize::MAX);
        assert!(matches!(
            result,
            Err(StoreError::PageOutOfRange {
                page_index: usize::MAX,
                page_size: 10
            })
        ));
    }

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(page_count(0, size(10)), 0);
        assert_eq!(page_count(1, size(10)), 1);
        assert_eq!(page_count(10, size(10)), 1);
        assert_eq!(page_count(27, size(10)), 3);
        assert_eq!(page_count(30, size(10)), 3);
        assert_eq!(page_count(5, size(1)), 5);
    }

    #[test]
    fn test_from_outcome() {
        let outcome = QueryOutcome {
            data: vec!["a"; 7],
            total: 27,
        };
        let page = ResultPage::from_outcome(outcome, size(10));
        assert_eq!(page.items.len(), 7);
        assert_eq!(page.total_count, 27);
        assert_eq!(page.page_count, 3);
    }

    #[test]
    fn test_request_deserializes_search() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"mode":"search","query":"report","page_index":2}"#).unwrap();
        assert_eq!(request, QueryRequest::search("report", 2));
    }

    #[test]
    fn test_request_deserializes_latest_with_default_page() {
        let request: QueryRequest = serde_json::from_str(r#"{"mode":"latest"}"#).unwrap();
        assert_eq!(request, QueryRequest::latest(0));
    }

    #[test]
    fn test_request_rejects_unknown_mode() {
        let result = serde_json::from_str::<QueryRequest>(r#"{"mode":"oldest","page_index":0}"#);
        assert!(result.is_err());
    }
}
