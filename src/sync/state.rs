use serde::Serialize;

use crate::feed::{Category, ErrorKind, FeedError};
use crate::storage::Article;

/// Position in the remote feed that the next load will request.
///
/// Only the engine mutates it. `page` is 1-based and resets to 1 whenever the
/// category or query changes or a refresh starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub page_size: u32,
    pub category: Option<Category>,
    pub query: Option<String>,
}

impl PageCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            category: None,
            query: None,
        }
    }

    /// True if the cursor already targets this category/query pair.
    pub fn targets(&self, category: Option<Category>, query: Option<&str>) -> bool {
        self.category == category && self.query.as_deref() == query
    }

    /// Point at page 1 of a (possibly new) category/query pair.
    pub fn reset(&mut self, category: Option<Category>, query: Option<String>) {
        self.page = 1;
        self.category = category;
        self.query = query;
    }
}

/// Lifecycle of the engine, re-entered on every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    /// Nothing loaded yet, or the last load was abandoned mid-flight
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// User-visible rendition of a [`FeedError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FeedError> for SyncError {
    fn from(err: &FeedError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Everything the presentation layer renders.
///
/// Published through a `watch` channel; each update replaces the whole
/// value, so readers never observe half of a field group.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub articles: Vec<Article>,
    pub phase: SyncPhase,
    pub error: Option<SyncError>,
    pub can_load_more: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            articles: Vec::new(),
            phase: SyncPhase::Idle,
            error: None,
            can_load_more: true,
        }
    }
}

impl SyncState {
    pub fn is_loading(&self) -> bool {
        self.phase == SyncPhase::Loading
    }
}

/// Append `incoming` to `articles`, skipping URLs already present.
///
/// Existing order is kept and incoming order is preserved; nothing is
/// re-sorted across pages.
pub(crate) fn append_unique(articles: &mut Vec<Article>, incoming: Vec<Article>) -> usize {
    let mut seen: std::collections::HashSet<String> =
        articles.iter().map(|a| a.url.clone()).collect();
    let before = articles.len();
    for article in incoming {
        if seen.insert(article.url.clone()) {
            articles.push(article);
        }
    }
    articles.len() - before
}
