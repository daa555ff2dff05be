use std::sync::Arc;

use music_assist::catalog::Catalog;
use music_assist::config::AppConfig;
use music_assist::email::EmailSender;
use music_assist::executor::Executor;
use music_assist::http::{self, rate_limit::RateLimiter, AppState};
use music_assist::llm::AnthropicClient;
use music_assist::platform::accounts::AccountCache;
use music_assist::platform::PlatformClient;
use music_assist::search::SearchClient;
use music_assist::store::{Database, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    let catalog = Arc::new(Catalog::load(&config.playlist_catalog)?);
    tracing::info!(
        playlists = catalog.len(),
        path = %config.playlist_catalog,
        "Playlist catalog loaded"
    );

    // Persistence is optional: without a database the service degrades to
    // the email-only submission path.
    let store = match &config.database_url {
        Some(path) => Some(Arc::new(Store::new(Arc::new(Database::open(path)?)))),
        None => {
            tracing::warn!("DATABASE_URL not set; running without persistence");
            None
        }
    };

    let llm = config
        .anthropic_api_key
        .clone()
        .map(|key| Arc::new(AnthropicClient::new(key, config.anthropic_model.clone())));
    if llm.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set; chat consultation disabled");
    }

    let search = config
        .search_api_key
        .clone()
        .map(|key| Arc::new(SearchClient::new(key)));

    let platform = config
        .syb_api_token
        .clone()
        .map(|token| Arc::new(PlatformClient::new(token)));
    let accounts = platform
        .as_ref()
        .map(|p| Arc::new(AccountCache::new(Arc::clone(p))));

    let mailer = EmailSender::from_config(config.smtp_user.as_deref(), config.smtp_pass.as_deref());
    if mailer.is_none() {
        tracing::warn!("SMTP credentials not set; outbound email disabled");
    }

    // The schedule executor needs persistence; without it there is nothing
    // to run against.
    let executor_handle = store.as_ref().map(|store| {
        Arc::new(Executor::new(
            Arc::clone(store),
            platform.clone(),
            mailer.clone(),
            config.clone(),
        ))
        .spawn()
    });

    let state = AppState {
        config: config.clone(),
        catalog,
        store,
        llm,
        search,
        platform,
        accounts,
        mailer,
        limiter: Arc::new(RateLimiter::new()),
    };

    tokio::select! {
        result = http::serve(state, config.port) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    if let Some(handle) = executor_handle {
        handle.abort();
    }

    Ok(())
}
