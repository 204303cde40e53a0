use sqlx::SqliteConnection;

use super::schema::Database;
use super::types::{Article, CachedArticleRecord, DatabaseError};

/// Upper bound on favorites returned in one listing
const MAX_FAVORITES: i64 = 2000;

impl Database {
    // ========================================================================
    // Favorite Mutations
    // ========================================================================

    /// Set the favorite flag on every record for `article.url`.
    ///
    /// When no record exists and `favorite` is true, a standalone record is
    /// inserted (no category or query context) stamped with `saved_at`.
    /// Clearing the flag on an unknown URL writes nothing.
    pub(crate) async fn write_favorite(
        &self,
        article: &Article,
        favorite: bool,
        saved_at: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        apply_favorite(&mut tx, article, favorite, saved_at).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Flip the favorite flag for `article.url`, returning the new value.
    ///
    /// Read and write share one transaction so a concurrent toggle cannot
    /// observe the intermediate state.
    pub(crate) async fn flip_favorite(
        &self,
        article: &Article,
        saved_at: i64,
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let (current,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM cached_articles WHERE url = ? AND is_favorite = 1)",
        )
        .bind(&article.url)
        .fetch_one(&mut *tx)
        .await?;

        let target = !current;
        apply_favorite(&mut tx, article, target, saved_at).await?;
        tx.commit().await?;
        Ok(target)
    }

    // ========================================================================
    // Favorite Queries
    // ========================================================================

    /// Whether `url` is currently a favorite.
    pub(crate) async fn url_is_favorite(&self, url: &str) -> Result<bool, DatabaseError> {
        let (favorite,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM cached_articles WHERE url = ? AND is_favorite = 1)",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(favorite)
    }

    /// All favorite URLs.
    pub(crate) async fn favorite_url_set(&self) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT url FROM cached_articles WHERE is_favorite = 1")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    /// Favorites, one record per URL (the most recently saved), newest first.
    pub(crate) async fn favorite_records(&self) -> Result<Vec<CachedArticleRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, CachedArticleRecord>(
            r#"
            SELECT id, url, source_id, source_name, author, title, description,
                   image_url, published_at, content, category, search_query,
                   saved_at, is_favorite
            FROM (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY url ORDER BY saved_at DESC, id DESC
                ) AS rn
                FROM cached_articles
                WHERE is_favorite = 1
            )
            WHERE rn = 1
            ORDER BY saved_at DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(MAX_FAVORITES)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Shared body of [`Database::write_favorite`] and [`Database::flip_favorite`].
async fn apply_favorite(
    conn: &mut SqliteConnection,
    article: &Article,
    favorite: bool,
    saved_at: i64,
) -> Result<(), DatabaseError> {
    let updated = sqlx::query("UPDATE cached_articles SET is_favorite = ? WHERE url = ?")
        .bind(favorite)
        .bind(&article.url)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 && favorite {
        sqlx::query(
            r#"
            INSERT INTO cached_articles (url, source_id, source_name, author, title,
                description, image_url, published_at, content, saved_at, is_favorite)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
        "#,
        )
        .bind(&article.url)
        .bind(&article.source_id)
        .bind(&article.source_name)
        .bind(&article.author)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.image_url)
        .bind(&article.published_at)
        .bind(&article.content)
        .bind(saved_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
