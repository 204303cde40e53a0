use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::redirect::Policy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use newsdesk::config::{Config, API_KEY_ENV};
use newsdesk::feed::{Category, NewsClient};
use newsdesk::storage::{Article, ArticleStore, Database, DatabaseError};
use newsdesk::sync::{LoadOutcome, SyncEngine, SyncState};

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdesk"))
}

/// Follow at most 3 redirects and never leave the original host, since the
/// API key header would travel with the request.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let same_host = attempt
            .previous()
            .first()
            .map(|first| first.host_str() == attempt.url().host_str())
            .unwrap_or(false);
        if !same_host {
            return attempt.error("Cross-host redirect refused");
        }

        tracing::debug!(to = %attempt.url().path(), hop = attempt.previous().len(), "Following redirect");
        attempt.follow()
    })
}

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Headline reader with a local cache and favorites")]
struct Args {
    /// Database file (default: ~/.config/newsdesk/news.db)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long, global = true)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load top headlines, following pagination
    Headlines {
        #[arg(long, short)]
        category: Option<Category>,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Search headlines by free text
    Search {
        query: String,

        #[arg(long, short)]
        category: Option<Category>,
    },
    /// List favorite articles
    Favorites,
    /// Toggle favorite status of a cached article
    Favorite { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;

    let db_path = args.db.unwrap_or_else(|| config_dir.join("news.db"));
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        eprintln!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of newsdesk appears to be using the database.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };
    let store = ArticleStore::with_retention_hours(db, config.retention_hours);

    let http = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;
    let client = NewsClient::from_config(http, &config);

    let needs_network = matches!(args.command, Command::Headlines { .. } | Command::Search { .. });
    if needs_network && config.resolve_api_key().is_none() {
        eprintln!("Warning: no API key configured; set {} or api_key in config.toml", API_KEY_ENV);
    }

    let engine = SyncEngine::new(Arc::new(client), store);

    match args.command {
        Command::Headlines { category, pages } => {
            if let Some(category) = category {
                eprintln!("{} headlines", category.display_name());
            }
            let mut outcome = engine.load(category, None, true).await;
            for _ in 1..pages {
                if !matches!(outcome, LoadOutcome::Loaded { received } if received > 0) {
                    break;
                }
                outcome = engine.load_next_page().await;
            }
            print_state(&engine.state());
        }
        Command::Search { query, category } => {
            engine.load(category, Some(&query), true).await;
            print_state(&engine.state());
        }
        Command::Favorites => {
            let favorites = engine.favorites().await;
            if favorites.is_empty() {
                println!("No favorites yet.");
            }
            for article in &favorites {
                print_article(article);
            }
        }
        Command::Favorite { url } => {
            let Some(article) = engine.store().find_by_url(&url).await else {
                anyhow::bail!("No cached article with URL {}", url);
            };
            let updated = engine.toggle_favorite(&article).await;
            if updated.is_favorite {
                println!("Added to favorites: {}", updated.title);
            } else {
                println!("Removed from favorites: {}", updated.title);
            }
        }
    }

    Ok(())
}

fn print_state(state: &SyncState) {
    for article in &state.articles {
        print_article(article);
    }
    if let Some(error) = &state.error {
        eprintln!("Error ({:?}): {}", error.kind, error);
    }
    eprintln!(
        "{} articles{}",
        state.articles.len(),
        if state.can_load_more { "" } else { " (end of feed)" }
    );
}

fn print_article(article: &Article) {
    let star = if article.is_favorite { "*" } else { " " };
    println!(
        "{} {}  {} [{}]",
        star, article.published_at, article.title, article.source_name
    );
    println!("    {}", article.url);
}
