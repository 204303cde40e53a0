use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer errors.
///
/// These never cross the [`ArticleStore`](super::ArticleStore) boundary: the
/// store logs them and degrades to an empty result or a no-op. Outside the
/// storage module they surface only from [`Database::open`](super::Database::open).
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The article cache is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// as one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A news article as handed to the presentation layer.
///
/// Identity is the `url`: two values with the same URL are the same logical
/// article even when the remote has since edited its title or content.
/// `is_favorite` is always derived from the store when the value is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub source_name: String,
    pub source_id: Option<String>,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    /// ISO-8601, compared as a string
    pub published_at: String,
    pub content: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Article {
    /// True when both values refer to the same logical article.
    pub fn same_article(&self, other: &Article) -> bool {
        self.url == other.url
    }
}

/// Persisted row: an [`Article`] plus the context it was cached under.
///
/// One record is written per article per successful remote fetch, so the
/// same URL may appear several times with different `saved_at` stamps.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CachedArticleRecord {
    pub id: i64,
    pub url: String,
    pub source_id: Option<String>,
    pub source_name: String,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub published_at: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub search_query: Option<String>,
    /// Unix epoch milliseconds
    pub saved_at: i64,
    pub is_favorite: bool,
}

impl CachedArticleRecord {
    pub(crate) fn into_article(self) -> Article {
        Article {
            source_name: self.source_name,
            source_id: self.source_id,
            author: self.author,
            title: self.title,
            description: self.description,
            url: self.url,
            image_url: self.image_url,
            published_at: self.published_at,
            content: self.content,
            is_favorite: self.is_favorite,
        }
    }
}
