//! Pagination types
//!
//! Page indexes are zero-based: page `n` of size `s` skips `n * s` rows.

use serde::{Deserialize, Serialize};

use crate::config::QueryConfig;

/// Pagination parameters (from query string)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Page number (0-indexed)
    #[serde(default)]
    pub page_index: usize,

    /// Items per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: default_page_size(),
        }
    }
}

impl PageRequest {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    /// Clamp the page size into the configured bounds
    pub fn clamped(self, config: &QueryConfig) -> Self {
        let page_size = if self.page_size == 0 {
            config.default_page_size
        } else {
            self.page_size.min(config.max_page_size)
        };
        Self {
            page_index: self.page_index,
            page_size,
        }
    }

    /// Number of rows skipped before this page
    pub fn skip(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }

    pub fn take(&self) -> usize {
        self.page_size
    }
}

/// One page of results plus the totals needed to navigate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, page_index: usize, page_size: usize, total_count: usize) -> Self {
        let total_pages = if page_size == 0 {
            1
        } else {
            total_count.div_ceil(page_size)
        };
        Self {
            items,
            page_index,
            page_size,
            total_count,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
        }
    }
}
