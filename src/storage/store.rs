//! Fail-soft article cache.
//!
//! [`ArticleStore`] is the only public way to touch cached articles. Every
//! storage failure is logged and degraded to an empty result or a no-op: the
//! cache speeds up browsing but is never allowed to break it.

use std::collections::HashSet;

use super::schema::Database;
use super::types::Article;

/// Default retention window for non-favorite records (24 hours)
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Largest page a single `fetch` will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Local article store backed by an injected [`Database`] handle.
#[derive(Clone)]
pub struct ArticleStore {
    db: Database,
    retention_ms: i64,
}

impl ArticleStore {
    /// Store with the default 24-hour retention window.
    pub fn new(db: Database) -> Self {
        Self::with_retention_hours(db, DEFAULT_RETENTION_HOURS)
    }

    /// Store with a custom retention window (minimum one hour).
    pub fn with_retention_hours(db: Database, hours: i64) -> Self {
        let hours = hours.max(1);
        Self {
            db,
            retention_ms: hours.saturating_mul(60 * 60 * 1000),
        }
    }

    /// Underlying storage handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Cache one page of articles.
    ///
    /// First evicts every non-favorite record older than the retention window,
    /// then inserts one fresh record per article stamped with the current
    /// time, `category` and `query`. URLs are not deduplicated here.
    pub async fn save(&self, articles: &[Article], category: Option<&str>, query: Option<&str>) {
        let now = now_ms();
        self.save_at(articles, category, query, now).await;
    }

    pub(crate) async fn save_at(
        &self,
        articles: &[Article],
        category: Option<&str>,
        query: Option<&str>,
        now: i64,
    ) {
        let stale_before = now.saturating_sub(self.retention_ms);
        match self
            .db
            .save_articles(articles, category, query, now, stale_before)
            .await
        {
            Ok((evicted, inserted)) => {
                tracing::debug!(
                    evicted = evicted,
                    inserted = inserted,
                    category = ?category,
                    query = ?query,
                    "Cached article page"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, count = articles.len(), "Failed to cache articles");
            }
        }
    }

    /// Read a page of cached articles.
    ///
    /// `category` matches exactly; a non-empty `query` matches title or
    /// description case-insensitively. Results are ordered by `published_at`
    /// descending, offset by `(page - 1) * page_size`. A `page` of 0 or a
    /// `page_size` of 0 yields an empty page.
    pub async fn fetch(
        &self,
        category: Option<&str>,
        query: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Vec<Article> {
        if page == 0 || page_size == 0 {
            tracing::debug!(page = page, page_size = page_size, "Empty cache page requested");
            return Vec::new();
        }
        let page_size = page_size.min(MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);
        let query = query.filter(|q| !q.is_empty());

        match self
            .db
            .query_cached(category, query, offset, i64::from(page_size))
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.into_article()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, page = page, "Failed to read cached articles");
                Vec::new()
            }
        }
    }

    /// Set the favorite flag for `article`.
    ///
    /// Updates every cached record with the same URL; if there is none and
    /// `favorite` is true, a standalone favorite record is created. Setting a
    /// flag to its current value leaves the persisted state unchanged.
    pub async fn set_favorite(&self, article: &Article, favorite: bool) {
        if let Err(e) = self.db.write_favorite(article, favorite, now_ms()).await {
            tracing::warn!(error = %e, url = %article.url, favorite = favorite, "Failed to update favorite");
        }
    }

    /// Flip the favorite flag for `article`, returning the new value.
    ///
    /// Returns `None` if the store could not be updated.
    pub async fn toggle_favorite(&self, article: &Article) -> Option<bool> {
        match self.db.flip_favorite(article, now_ms()).await {
            Ok(favorite) => {
                tracing::debug!(url = %article.url, favorite = favorite, "Favorite toggled");
                Some(favorite)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %article.url, "Failed to toggle favorite");
                None
            }
        }
    }

    /// Whether `url` is a favorite. Storage failures read as `false`.
    pub async fn is_favorite(&self, url: &str) -> bool {
        match self.db.url_is_favorite(url).await {
            Ok(favorite) => favorite,
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Failed to read favorite status");
                false
            }
        }
    }

    /// Subset of `urls` that are favorites.
    pub async fn favorite_urls<'a, I>(&self, urls: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let favorites: HashSet<String> = match self.db.favorite_url_set().await {
            Ok(all) => all.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read favorite set");
                return HashSet::new();
            }
        };
        urls.into_iter()
            .filter(|url| favorites.contains(*url))
            .map(str::to_owned)
            .collect()
    }

    /// All favorites, newest save first, one entry per URL.
    pub async fn list_favorites(&self) -> Vec<Article> {
        match self.db.favorite_records().await {
            Ok(rows) => rows.into_iter().map(|r| r.into_article()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list favorites");
                Vec::new()
            }
        }
    }

    /// Most recently cached copy of the article at `url`.
    pub async fn find_by_url(&self, url: &str) -> Option<Article> {
        match self.db.latest_by_url(url).await {
            Ok(row) => row.map(|r| r.into_article()),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Failed to look up cached article");
                None
            }
        }
    }

    /// Number of cached records, duplicates included. 0 on failure.
    pub async fn cached_count(&self) -> i64 {
        self.db.count_cached().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to count cached articles");
            0
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
