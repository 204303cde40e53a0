mod articles;
mod favorites;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::{ArticleStore, DEFAULT_RETENTION_HOURS, MAX_PAGE_SIZE};
pub use types::{Article, CachedArticleRecord, DatabaseError};
