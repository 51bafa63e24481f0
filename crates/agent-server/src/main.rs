//! ICD-10 Coding Agent HTTP Server
//!
//! Axum-based server exposing the coding agent over a JSON API.

mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentConfig, LlmProvider, MemorySessionStore, ToolRegistry};
use agent_runtime::OpenAiProvider;
use icd_coder::{register_tools, BuiltinCatalog, CodeCatalog, MEDICAL_CODER_PROMPT};

use crate::routes::router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_env()?);

    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Model backend reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Model backend not reachable - requests will fail");
            tracing::warn!("  Check OPENAI_BASE_URL and OPENAI_API_KEY in .env");
        }
    }

    // Initialize tools
    let catalog: Arc<dyn CodeCatalog> = Arc::new(BuiltinCatalog::new());
    let mut tools = ToolRegistry::new();
    register_tools(&mut tools, catalog)?;

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    // Loop settings
    let mut config = AgentConfig {
        system_prompt: MEDICAL_CODER_PROMPT.into(),
        ..AgentConfig::default()
    };
    if let Ok(model) = std::env::var("OPENAI_MODEL") {
        config.generation.model = model;
    }
    if let Ok(value) = std::env::var("AGENT_MAX_ITERATIONS") {
        config.max_iterations = value
            .parse()
            .context("AGENT_MAX_ITERATIONS must be a positive integer")?;
    }
    anyhow::ensure!(config.max_iterations > 0, "AGENT_MAX_ITERATIONS must be at least 1");
    tracing::info!(
        model = %config.generation.model,
        max_iterations = config.max_iterations,
        "Agent configured"
    );

    // Build application state
    let state = AppState::new(
        provider,
        Arc::new(tools),
        Arc::new(MemorySessionStore::new()),
        config,
    );

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 ICD-10 coding agent running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  GET  /api/tools         - List tools");
    tracing::info!("  POST /api/chat          - Ask a question");
    tracing::info!("  POST /api/analyze       - Code a patient note");
    tracing::info!("  GET  /api/sessions/{{id}} - Session history");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
