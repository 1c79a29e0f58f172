use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::db::{BugheadDb, DbHandle};
use crate::github::GitHubClient;
use crate::report::ReportPipeline;
use crate::summarizer::{GeminiSummarizer, NoopSummarizer, Summarize};

/// Build the full application router.
///
/// CORS is permissive unconditionally: the widget is embedded on arbitrary
/// third-party origins by design.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Assemble state from configuration: real GitHub client, Gemini summarizer
/// when a key is configured, no-op summarizer otherwise.
pub fn build_state(config: &AppConfig, db: DbHandle) -> Arc<AppState> {
    let tracker = Arc::new(GitHubClient::with_api_base(
        &config.github_token,
        &config.github_api_base,
    ));
    let summarizer: Arc<dyn Summarize> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiSummarizer::with_api_base(key, &config.gemini_api_base)),
        None => {
            tracing::info!("GEMINI_API_KEY not set, summarization disabled");
            Arc::new(NoopSummarizer)
        }
    };
    let pipeline = ReportPipeline::new(db.clone(), tracker, summarizer);
    Arc::new(AppState {
        db,
        pipeline,
        google_userinfo_url: api::GOOGLE_USERINFO_URL.to_string(),
        http: reqwest::Client::new(),
    })
}

/// Start the server and run until Ctrl+C.
pub async fn start_server(config: AppConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = BugheadDb::new(&config.db_path).context("Failed to initialize database")?;
    let state = build_state(&config, DbHandle::new(db));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("bughead API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
