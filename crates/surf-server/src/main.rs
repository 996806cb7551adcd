//! Surf server entry point

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use surf_core::{
    ChatEngine, EngineConfig, GenaiProvider, HttpMeshConnector, ResponseFilter, ToolCache,
};
use surf_server::{app, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surf_server=info,surf_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let connector = Arc::new(HttpMeshConnector::new(
        config.mesh_url.clone(),
        config.mesh_api_key.clone(),
    ));
    let tools = Arc::new(ToolCache::new(
        connector,
        ResponseFilter::new(config.tool_max_tokens),
        config.tool_ttl,
    ));
    let engine = ChatEngine::new(
        Arc::new(GenaiProvider::new()),
        tools,
        EngineConfig {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            max_steps: config.max_steps,
            ..Default::default()
        },
    );

    let state = AppState {
        engine: Arc::new(engine),
    };

    tracing::info!(bind = %config.bind, model = %config.model, mesh = %config.mesh_url, "starting surf server");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
