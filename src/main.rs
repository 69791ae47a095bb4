mod agent;
mod assembly;
mod config;
mod error;
mod evaluation;
mod handlers;
mod mediator;
mod metrics;
mod model;
mod ws;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

use crate::agent::AgentFactory;
use crate::assembly::{AssemblyStore, InMemoryAssemblyStore};
use crate::evaluation::Orchestrator;
use crate::mediator::{BroadcastMediator, MediatorSet};
use crate::model::OpenAiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grader_orchestrator=info".parse()?),
        )
        .init();

    let config = Arc::new(config::Config::from_env());
    config.print_banner();

    let store = Arc::new(InMemoryAssemblyStore::new());
    if let Some(ref seed) = config.assembly_seed_file {
        store
            .load_seed(seed)
            .context("Failed to seed assembly store")?;
    }
    let store: Arc<dyn AssemblyStore> = store;

    let routes = Arc::new(config.model_routes());
    if routes.is_empty() {
        anyhow::bail!("MODEL_ROUTES defines no routes");
    }

    let model = Arc::new(
        OpenAiClient::new(&config.model_base_url, config.model_api_key.clone())
            .context("Failed to build model client")?,
    );

    let metrics_store = metrics::Metrics::new();
    let events = Arc::new(BroadcastMediator::new(config.event_channel_capacity));
    let mediators = MediatorSet::new()
        .with(metrics_store.clone())
        .with(events.clone());

    let factory = AgentFactory::new(
        routes,
        model,
        Duration::from_secs(config.model_timeout_secs),
    )
    .with_mediator(Arc::new(mediators));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), factory));

    let state = Arc::new(handlers::AppState {
        config: config.clone(),
        store,
        orchestrator,
        metrics: metrics_store,
        events,
        semaphore: Arc::new(Semaphore::new(config.max_concurrent_runs)),
        started_at: chrono::Utc::now(),
    });

    let app = handlers::router(state);
    let addr = format!("0.0.0.0:{}", config.port);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, draining...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
