use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, CachedArticleRecord, DatabaseError};

/// Rows per multi-row INSERT. 12 columns * 50 = 600 binds, under SQLite's 999 limit.
const INSERT_BATCH_SIZE: usize = 50;

const RECORD_COLUMNS: &str = "id, url, source_id, source_name, author, title, description, \
     image_url, published_at, content, category, search_query, saved_at, is_favorite";

impl Database {
    // ========================================================================
    // Cache Writes
    // ========================================================================

    /// Evict stale records, then insert one record per article.
    ///
    /// Runs in a single transaction:
    /// 1. Delete every non-favorite record with `saved_at < stale_before`.
    /// 2. Insert `articles` stamped with `saved_at`, `category`, `query`.
    /// 3. New records whose URL is already a favorite inherit the flag, so
    ///    every record of a URL agrees on favorite status.
    ///
    /// Returns `(evicted, inserted)`.
    pub(crate) async fn save_articles(
        &self,
        articles: &[Article],
        category: Option<&str>,
        query: Option<&str>,
        saved_at: i64,
        stale_before: i64,
    ) -> Result<(u64, usize), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let evicted = sqlx::query(
            "DELETE FROM cached_articles WHERE saved_at < ? AND is_favorite = 0",
        )
        .bind(stale_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        for chunk in articles.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO cached_articles (url, source_id, source_name, author, title, \
                 description, image_url, published_at, content, category, search_query, saved_at) ",
            );
            builder.push_values(chunk, |mut b, article| {
                b.push_bind(&article.url)
                    .push_bind(&article.source_id)
                    .push_bind(&article.source_name)
                    .push_bind(&article.author)
                    .push_bind(&article.title)
                    .push_bind(&article.description)
                    .push_bind(&article.image_url)
                    .push_bind(&article.published_at)
                    .push_bind(&article.content)
                    .push_bind(category)
                    .push_bind(query)
                    .push_bind(saved_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        if !articles.is_empty() {
            sqlx::query(
                r#"
                UPDATE cached_articles SET is_favorite = 1
                WHERE saved_at = ? AND is_favorite = 0
                  AND url IN (SELECT url FROM cached_articles WHERE is_favorite = 1)
            "#,
            )
            .bind(saved_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((evicted, articles.len()))
    }

    // ========================================================================
    // Cache Reads
    // ========================================================================

    /// Filtered, paginated read ordered by `published_at` DESC.
    ///
    /// - `category`: exact match
    /// - `query`: case-insensitive substring of `title` OR `description`
    ///
    /// Filters are AND-combined. `offset` and `limit` are in rows.
    pub(crate) async fn query_cached(
        &self,
        category: Option<&str>,
        query: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CachedArticleRecord>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM cached_articles WHERE 1 = 1"));

        if let Some(category) = category {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }

        // instr() instead of LIKE so '%' and '_' in the query match literally
        if let Some(query) = query {
            builder.push(" AND (instr(lower(title), lower(");
            builder.push_bind(query);
            builder.push(")) > 0 OR instr(lower(COALESCE(description, '')), lower(");
            builder.push_bind(query);
            builder.push(")) > 0)");
        }

        builder.push(" ORDER BY published_at DESC, saved_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<CachedArticleRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Most recently saved record for `url`, if any.
    pub(crate) async fn latest_by_url(
        &self,
        url: &str,
    ) -> Result<Option<CachedArticleRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, CachedArticleRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM cached_articles WHERE url = ? \
             ORDER BY saved_at DESC, id DESC LIMIT 1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Total number of cached records, duplicates included.
    pub(crate) async fn count_cached(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
