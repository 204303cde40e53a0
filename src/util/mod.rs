//! Input normalisation shared by the sync engine and the CLI.

mod query;

pub use query::normalize_query;

/// Maximum search query length in characters; longer input is truncated
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
