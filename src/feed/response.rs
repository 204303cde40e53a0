//! Wire format of the news API's `top-headlines` endpoint.

use serde::Deserialize;

use crate::storage::Article;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewsResponse {
    pub status: String,
    pub total_results: Option<u32>,
    pub articles: Vec<WireArticle>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSource {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireArticle {
    pub source: WireSource,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
    pub published_at: String,
    pub content: Option<String>,
}

impl From<WireArticle> for Article {
    fn from(wire: WireArticle) -> Self {
        Article {
            source_name: wire.source.name,
            source_id: wire.source.id,
            author: wire.author,
            title: wire.title,
            description: wire.description,
            url: wire.url,
            image_url: wire.url_to_image,
            published_at: wire.published_at,
            content: wire.content,
            is_favorite: false,
        }
    }
}

/// Body the API sends alongside non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// `"code: message"`, or whichever half is present.
    pub fn describe(&self) -> Option<String> {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }
}
