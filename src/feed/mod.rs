//! Remote feed client for the news API.
//!
//! Stateless: every call issues one `top-headlines` request and returns the
//! decoded page or a [`FeedError`]. Nothing is cached and nothing is retried.

mod category;
mod client;
mod error;
mod response;

pub use category::{Category, ParseCategoryError};
pub use client::{FeedSource, NewsClient, Page, DEFAULT_BASE_URL, DEFAULT_COUNTRY, DEFAULT_PAGE_SIZE};
pub use error::{ErrorKind, FeedError};
