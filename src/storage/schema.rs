use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Explicit storage handle.
///
/// Opened once at process start and passed to whoever needs persistence;
/// cloning shares the underlying pool. Tests open `":memory:"`.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked, `DatabaseError::Migration` if the schema could not be
    /// created, and `DatabaseError::Other` for anything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // Pre-create the file user-only so the cache never exists world-readable
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // SQLite reports the real error at connect_with
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        // Every connection to ":memory:" is its own database, so pin the pool
        // to a single connection that never gets recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Article cache opened");
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// Every statement is `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // No UNIQUE(url): the same article may be cached once per fetch
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_articles (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                source_id TEXT,
                source_name TEXT NOT NULL,
                author TEXT,
                title TEXT NOT NULL,
                description TEXT,
                image_url TEXT,
                published_at TEXT NOT NULL,
                content TEXT,
                category TEXT,
                search_query TEXT,
                saved_at INTEGER NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cached_articles_url ON cached_articles(url)")
            .execute(&mut *tx)
            .await?;

        // fetch(): optional category filter, ordered by published_at DESC
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cached_articles_category_published ON cached_articles(category, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Eviction scans non-favorites by age
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cached_articles_favorite_saved ON cached_articles(is_favorite, saved_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
