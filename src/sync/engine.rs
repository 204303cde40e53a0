use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::state::{append_unique, PageCursor, SyncError, SyncPhase, SyncState};
use crate::feed::{Category, FeedSource};
use crate::storage::{Article, ArticleStore};
use crate::util::normalize_query;

/// Result of a load-type operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Remote page received; `received` is its size before deduplication
    Loaded { received: usize },
    /// Remote fetch failed; the error is also in the published state
    Failed(SyncError),
    /// Not started: another load is in flight, or there is nothing to do
    Skipped,
}

/// Parameters of one remote load.
#[derive(Debug, Clone)]
struct LoadRequest {
    page: u32,
    category: Option<Category>,
    query: Option<String>,
    /// Replace displayed articles instead of appending
    refreshing: bool,
    /// Cursor page to restore if a load-more fails
    rollback_to: Option<u32>,
}

/// Single-flight token. Dropping it releases the engine for the next load
/// and, if the load was abandoned mid-flight, takes the phase out of
/// `Loading`.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<SyncState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|s| {
            if s.phase == SyncPhase::Loading {
                s.phase = SyncPhase::Idle;
                true
            } else {
                false
            }
        });
        self.flag.store(false, Ordering::Release);
    }
}

/// Reconciles the local article cache with the remote paginated feed.
///
/// Owns the [`PageCursor`] and the published [`SyncState`]. At most one
/// load runs at a time: a load/refresh/load-more/search issued while another
/// is in flight is dropped with a warning, never queued or interleaved.
/// All operations take `&self`, so one engine can be shared behind an `Arc`.
///
/// Favorite status is owned by the [`ArticleStore`]; articles in the state
/// carry the store's answer at the time they were published.
pub struct SyncEngine {
    source: Arc<dyn FeedSource>,
    store: ArticleStore,
    cursor: Mutex<PageCursor>,
    state: watch::Sender<SyncState>,
    in_flight: AtomicBool,
    last_failed: Mutex<Option<LoadRequest>>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn FeedSource>, store: ArticleStore) -> Self {
        let page_size = source.page_size();
        let (state, _) = watch::channel(SyncState::default());
        Self {
            source,
            store,
            cursor: Mutex::new(PageCursor::new(page_size)),
            state,
            in_flight: AtomicBool::new(false),
            last_failed: Mutex::new(None),
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Receiver that sees every published state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Snapshot of the cursor.
    pub fn cursor(&self) -> PageCursor {
        self.lock_cursor().clone()
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load the cursor's page for `category`/`query`.
    ///
    /// With `is_refreshing`, or when the filter differs from the cursor's,
    /// pagination restarts at page 1 and displayed articles are replaced;
    /// otherwise the page is appended. `query` is normalised first; a blank
    /// query means no text filter.
    pub async fn load(
        &self,
        category: Option<Category>,
        query: Option<&str>,
        is_refreshing: bool,
    ) -> LoadOutcome {
        let Some(guard) = self.begin("load") else {
            return LoadOutcome::Skipped;
        };

        let query = query.and_then(normalize_query);
        let request = {
            let mut cursor = self.lock_cursor();
            let refreshing = is_refreshing || !cursor.targets(category, query.as_deref());
            if refreshing {
                cursor.reset(category, query.clone());
            }
            LoadRequest {
                page: cursor.page,
                category,
                query,
                refreshing,
                rollback_to: None,
            }
        };

        self.run(request, guard).await
    }

    /// Append the next page. No-op while loading or once the feed is exhausted.
    pub async fn load_next_page(&self) -> LoadOutcome {
        let Some(guard) = self.begin("load_next_page") else {
            return LoadOutcome::Skipped;
        };
        if !self.state.borrow().can_load_more {
            tracing::debug!("No more pages to load");
            return LoadOutcome::Skipped;
        }

        let request = {
            let mut cursor = self.lock_cursor();
            let previous = cursor.page;
            cursor.page += 1;
            LoadRequest {
                page: cursor.page,
                category: cursor.category,
                query: cursor.query.clone(),
                refreshing: false,
                rollback_to: Some(previous),
            }
        };

        self.run(request, guard).await
    }

    /// Restart from page 1 with the current category and query.
    pub async fn refresh(&self) -> LoadOutcome {
        let (category, query) = self.current_filter();
        self.load(category, query.as_deref(), true).await
    }

    /// Refresh with a new free-text query, keeping the category.
    /// A blank query clears the text filter.
    pub async fn search(&self, query: &str) -> LoadOutcome {
        let (category, _) = self.current_filter();
        self.load(category, Some(query), true).await
    }

    /// Refresh with `category` selected. Selecting the category that is
    /// already selected clears the category filter instead.
    pub async fn select_category(&self, category: Category) -> LoadOutcome {
        let (current, query) = self.current_filter();
        let next = if current == Some(category) {
            None
        } else {
            Some(category)
        };
        self.load(next, query.as_deref(), true).await
    }

    /// Re-issue the last failed load with identical parameters.
    pub async fn retry(&self) -> LoadOutcome {
        let Some(guard) = self.begin("retry") else {
            return LoadOutcome::Skipped;
        };
        let Some(request) = self.lock_failed().take() else {
            tracing::debug!("Nothing to retry");
            return LoadOutcome::Skipped;
        };

        {
            let mut cursor = self.lock_cursor();
            if request.refreshing {
                cursor.reset(request.category, request.query.clone());
            }
            cursor.page = request.page;
        }

        self.run(request, guard).await
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    /// Flip favorite status in the store and return the updated snapshot.
    pub async fn toggle_favorite(&self, article: &Article) -> Article {
        let favorite = match self.store.toggle_favorite(article).await {
            Some(favorite) => favorite,
            None => self.store.is_favorite(&article.url).await,
        };
        self.publish_favorite(article, favorite)
    }

    /// Set favorite status explicitly and return the updated snapshot.
    pub async fn set_favorite(&self, article: &Article, favorite: bool) -> Article {
        self.store.set_favorite(article, favorite).await;
        let favorite = self.store.is_favorite(&article.url).await;
        self.publish_favorite(article, favorite)
    }

    pub async fn is_favorite(&self, url: &str) -> bool {
        self.store.is_favorite(url).await
    }

    /// Favorites straight from the store.
    pub async fn favorites(&self) -> Vec<Article> {
        self.store.list_favorites().await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn begin(&self, operation: &'static str) -> Option<InFlight<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(operation = operation, "Load already in flight, dropping request");
            return None;
        }
        Some(InFlight {
            flag: &self.in_flight,
            state: &self.state,
        })
    }

    async fn run(&self, request: LoadRequest, _guard: InFlight<'_>) -> LoadOutcome {
        let category_key = request.category.map(Category::as_str);
        let query = request.query.as_deref();
        let page_size = self.source.page_size();

        let mut base_len = 0;
        self.state.send_modify(|s| {
            s.phase = SyncPhase::Loading;
            if request.refreshing {
                s.articles.clear();
                s.can_load_more = true;
            }
            base_len = s.articles.len();
        });

        // Show what the cache has for this page while the network call runs
        let preview = self
            .store
            .fetch(category_key, query, request.page, page_size)
            .await;
        if !preview.is_empty() {
            self.state.send_modify(|s| {
                append_unique(&mut s.articles, preview);
            });
        }

        tracing::debug!(
            page = request.page,
            category = ?request.category,
            query = ?request.query,
            refreshing = request.refreshing,
            "Loading headlines"
        );

        match self
            .source
            .fetch_page(request.page, request.category, query)
            .await
        {
            Ok(page) => {
                let mut articles = page.articles;
                let received = articles.len();

                self.store.save(&articles, category_key, query).await;

                let favorites = self
                    .store
                    .favorite_urls(articles.iter().map(|a| a.url.as_str()))
                    .await;
                for article in &mut articles {
                    article.is_favorite = favorites.contains(&article.url);
                }

                self.state.send_modify(|s| {
                    // Remote results supersede the cache preview
                    s.articles.truncate(base_len);
                    append_unique(&mut s.articles, articles);
                    s.can_load_more = received > 0;
                    s.error = None;
                    s.phase = SyncPhase::Loaded;
                });
                *self.lock_failed() = None;

                tracing::info!(page = request.page, received = received, "Headlines loaded");
                LoadOutcome::Loaded { received }
            }
            Err(e) => {
                let error = SyncError::from(&e);
                tracing::warn!(page = request.page, error = %e, "Failed to load headlines");

                if let Some(previous) = request.rollback_to {
                    self.lock_cursor().page = previous;
                }
                self.state.send_modify(|s| {
                    // A failed load-more leaves the list as it was; a failed
                    // refresh keeps the cache preview in place of the cleared list
                    if !request.refreshing {
                        s.articles.truncate(base_len);
                    }
                    s.error = Some(error.clone());
                    s.phase = SyncPhase::Errored;
                });
                *self.lock_failed() = Some(request);

                LoadOutcome::Failed(error)
            }
        }
    }

    fn publish_favorite(&self, article: &Article, favorite: bool) -> Article {
        self.state.send_if_modified(|s| {
            let mut changed = false;
            for shown in s.articles.iter_mut().filter(|a| a.same_article(article)) {
                changed |= shown.is_favorite != favorite;
                shown.is_favorite = favorite;
            }
            changed
        });
        Article {
            is_favorite: favorite,
            ..article.clone()
        }
    }

    fn current_filter(&self) -> (Option<Category>, Option<String>) {
        let cursor = self.lock_cursor();
        (cursor.category, cursor.query.clone())
    }

    fn lock_cursor(&self) -> MutexGuard<'_, PageCursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failed(&self) -> MutexGuard<'_, Option<LoadRequest>> {
        self.last_failed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
