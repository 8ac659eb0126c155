use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use debatehub::{api, config::AppConfig, state::AppState, store::MemoryStore, sweeper};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debatehub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DebateHub...");

    let config = AppConfig::from_env();

    // Initialize LLM providers
    let llm_manager = match config.llm.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized successfully");
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. Debates will wait for review and AI drafts are unavailable.",
                e
            );
            None
        }
    };

    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(store, &config, llm_manager));

    // Spawn background task pruning yesterday's rate-limit windows
    sweeper::spawn_window_sweeper(state.windows.clone(), config.sweep_interval);

    let app = api::router(state);

    tracing::info!("Listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await
}
