mod caption;
mod config;
mod errors;
mod llm_client;
mod pipeline;
mod post;
mod routes;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::caption::blip::{BlipBackend, MODEL_ID};
use crate::caption::CaptionAdapter;
use crate::config::Config;
use crate::llm_client::ChatModel;
use crate::routes::build_router;
use crate::session::{spawn_idle_sweep, SESSION_IDLE_TTL};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; a missing API key stops startup here
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Studio API v{}", env!("CARGO_PKG_VERSION"));

    // Load the caption model once; every session shares it read-only
    let backend = BlipBackend::load().await?;
    let captioner = std::sync::Arc::new(CaptionAdapter::new(backend));
    info!("Caption model ready ({MODEL_ID})");

    // Build app state (LLM client, generator, evaluator, session registry)
    let state = AppState::new(&config, captioner);
    info!(
        "LLM client initialized (generator: {}, evaluator: {})",
        ChatModel::Chat.as_str(),
        ChatModel::Reasoner.as_str()
    );

    // Drop sessions whose clients went away
    spawn_idle_sweep(state.sessions.clone());
    info!(
        "Idle sessions expire after {}s",
        SESSION_IDLE_TTL.as_secs()
    );

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
