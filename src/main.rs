use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use junkdesk::config::AppConfig;
use junkdesk::db::{self, KeyValueStore, MemoryStore, SqliteStore};
use junkdesk::handlers;
use junkdesk::services::ai::estimate::Estimator;
use junkdesk::services::ai::gemini::GeminiProvider;
use junkdesk::services::intake::IntakeSessions;
use junkdesk::services::repository::InquiryRepository;
use junkdesk::services::triage::TriageConsole;
use junkdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let store: Arc<dyn KeyValueStore> = if config.database_url == ":memory:" {
        tracing::warn!("using in-memory storage, inquiries will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::new(db::init_db(&config.database_url)?))
    };
    let repository = InquiryRepository::load(store)?;

    if config.gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set, every estimate will use the fallback");
    } else {
        tracing::info!("using Gemini estimation (model: {})", config.gemini_model);
    }
    let provider = GeminiProvider::new(config.gemini_api_key.clone(), config.gemini_model.clone())
        .with_base_url(config.gemini_base_url.clone());
    let estimator = Estimator::new(
        Box::new(provider),
        Duration::from_secs(config.estimate_timeout_secs),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        repository,
        estimator,
        intake: IntakeSessions::with_limits(
            Duration::from_secs(config.draft_idle_secs),
            config.max_drafts,
        ),
        console: TriageConsole::new(config.display_utc_offset_hours),
    });

    let app = handlers::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
