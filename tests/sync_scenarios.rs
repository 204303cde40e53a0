//! End-to-end scenarios: `NewsClient` against a mock API, `SyncEngine` on top,
//! backed by an in-memory SQLite store.
//!
//! Each test creates its own mock server and database for isolation.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsdesk::feed::{Category, ErrorKind, NewsClient};
use newsdesk::storage::{Article, ArticleStore, Database};
use newsdesk::sync::{LoadOutcome, SyncEngine, SyncPhase};

fn article_json(prefix: &str, n: usize) -> serde_json::Value {
    serde_json::json!({
        "source": {"id": "wire", "name": "Wire"},
        "author": "Desk",
        "title": format!("{prefix} story {n}"),
        "description": format!("About {prefix}"),
        "url": format!("https://wire.example/{prefix}/{n}"),
        "urlToImage": null,
        "publishedAt": format!("2024-05-01T{:02}:00:00Z", 23 - (n % 24)),
        "content": null
    })
}

fn page_json(prefix: &str, count: usize) -> serde_json::Value {
    let articles: Vec<_> = (0..count).map(|n| article_json(prefix, n)).collect();
    serde_json::json!({"status": "ok", "totalResults": 100, "articles": articles})
}

async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("page", page.to_string()))
        .and(header("X-Api-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn engine_for(server: &MockServer, timeout: Duration) -> SyncEngine {
    let client = NewsClient::new(
        reqwest::Client::new(),
        Some(SecretString::from("test-key".to_string())),
    )
    .with_base_url(&format!("{}/v2/", server.uri()))
    .with_timeout(timeout);
    let db = Database::open(":memory:").await.unwrap();
    SyncEngine::new(Arc::new(client), ArticleStore::new(db))
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_technology_first_page_then_load_more() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("category", "technology"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("one", 20)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("category", "technology"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("two", 20)))
        .expect(1)
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    engine.load(Some(Category::Technology), None, false).await;
    let state = engine.state();
    assert_eq!(state.articles.len(), 20);
    assert!(state.can_load_more);

    engine.load_next_page().await;
    let state = engine.state();
    assert_eq!(engine.cursor().page, 2);
    assert_eq!(state.articles.len(), 40);
    let unique: HashSet<&str> = state.articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(unique.len(), 40);
    // Appended in fetch order, not re-sorted
    assert_eq!(state.articles[19].url, "https://wire.example/one/19");
    assert_eq!(state.articles[20].url, "https://wire.example/two/0");

    // Both pages landed in the cache under the category
    let cached = engine
        .store()
        .fetch(Some("technology"), None, 1, 100)
        .await;
    assert_eq!(cached.len(), 40);
}

#[tokio::test]
async fn test_refresh_after_two_pages_replaces_list() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_json("one", 20)).await;
    mount_page(&server, 2, page_json("two", 20)).await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    engine.load(None, None, false).await;
    engine.load_next_page().await;
    assert_eq!(engine.state().articles.len(), 40);

    server.reset().await;
    mount_page(&server, 1, page_json("fresh", 20)).await;

    engine.refresh().await;
    let state = engine.state();
    assert_eq!(engine.cursor().page, 1);
    assert_eq!(state.articles.len(), 20);
    assert!(state.articles.iter().all(|a| a.url.contains("/fresh/")));
}

#[tokio::test]
async fn test_search_sends_normalised_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("q", "rate cut"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("rates", 3)))
        .expect(1)
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    let outcome = engine.search("  rate \n cut ").await;
    assert_eq!(outcome, LoadOutcome::Loaded { received: 3 });
    assert_eq!(engine.cursor().query.as_deref(), Some("rate cut"));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_transport_failure_keeps_loaded_articles() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_json("one", 20)).await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json("late", 20))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_millis(200)).await;

    engine.load(None, None, false).await;
    let before: Vec<String> = engine.state().articles.iter().map(|a| a.url.clone()).collect();

    let outcome = engine.load_next_page().await;
    assert!(matches!(outcome, LoadOutcome::Failed(_)));

    let state = engine.state();
    let after: Vec<String> = state.articles.iter().map(|a| a.url.clone()).collect();
    assert_eq!(after, before);
    assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::Network));
    assert_eq!(state.phase, SyncPhase::Errored);
    assert!(!engine.state().is_loading());
}

#[tokio::test]
async fn test_failed_load_more_over_warm_cache_then_retry() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_json("one", 20)).await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json("late", 20))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("two", 20)))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_millis(200)).await;

    let earlier: Vec<Article> = (0..40)
        .map(|n| Article {
            source_name: "Wire".to_string(),
            source_id: None,
            author: None,
            title: format!("earlier story {n}"),
            description: None,
            url: format!("https://wire.example/earlier/{n}"),
            image_url: None,
            published_at: format!("2024-05-02T{:02}:00:00Z", n % 24),
            content: None,
            is_favorite: false,
        })
        .collect();
    engine
        .store()
        .save(&earlier, Some("technology"), None)
        .await;

    engine.load(Some(Category::Technology), None, false).await;
    let before: Vec<String> = engine.state().articles.iter().map(|a| a.url.clone()).collect();
    assert_eq!(before.len(), 20);

    let outcome = engine.load_next_page().await;
    assert!(matches!(outcome, LoadOutcome::Failed(_)));
    let after: Vec<String> = engine.state().articles.iter().map(|a| a.url.clone()).collect();
    assert_eq!(after, before);

    assert_eq!(engine.retry().await, LoadOutcome::Loaded { received: 20 });
    let urls: Vec<String> = engine.state().articles.iter().map(|a| a.url.clone()).collect();
    let expected: Vec<String> = (0..20)
        .map(|n| format!("https://wire.example/one/{n}"))
        .chain((0..20).map(|n| format!("https://wire.example/two/{n}")))
        .collect();
    assert_eq!(urls, expected);
}

#[tokio::test]
async fn test_api_error_envelope_becomes_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "status": "error",
            "code": "apiKeyInvalid",
            "message": "Your API key is invalid or incorrect."
        })))
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    engine.load(None, None, false).await;
    let error = engine.state().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Rejected);
    assert!(error.message.contains("apiKeyInvalid"));
}

#[tokio::test]
async fn test_malformed_body_becomes_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "ok", "articles": [{"title": 7}]})),
        )
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    engine.load(None, None, false).await;
    assert_eq!(engine.state().error.map(|e| e.kind), Some(ErrorKind::Decode));
}

// ============================================================================
// Favorites
// ============================================================================

#[tokio::test]
async fn test_favorite_survives_refresh_and_shows_in_favorites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json("one", 5)))
        .expect(2)
        .mount(&server)
        .await;
    let engine = engine_for(&server, Duration::from_secs(5)).await;

    engine.load(None, None, false).await;
    let target = engine.state().articles[2].clone();
    let updated = engine.toggle_favorite(&target).await;
    assert!(updated.is_favorite);

    engine.refresh().await;
    let state = engine.state();
    let refreshed = state.articles.iter().find(|a| a.url == target.url).unwrap();
    assert!(refreshed.is_favorite);
    assert_eq!(state.articles.iter().filter(|a| a.is_favorite).count(), 1);

    let favorites = engine.favorites().await;
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].url, target.url);
}
