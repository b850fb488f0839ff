pub mod channel;
pub mod config;
pub mod dom;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod perception;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{InjectorConfig, RuntimeMode};
use crate::dom::Document;
use crate::engine::listener::{InjectorHandle, MessageListener};
use crate::engine::orchestrator::Orchestrator;
use crate::errors::InjectorResult;

/// Installs the fmt subscriber (`RUST_LOG`, default `info`). Safe to call twice.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Spawns the message listener for `doc`. In [`RuntimeMode::Live`] it first
/// runs the page-load flow against the current address.
/// Must be called from within a tokio runtime.
pub fn start(
    doc: Arc<dyn Document>,
    config: InjectorConfig,
    mode: RuntimeMode,
) -> InjectorResult<(InjectorHandle, JoinHandle<()>)> {
    config.validate()?;
    let orchestrator = Orchestrator::new(doc, Arc::new(config), mode);
    let (listener, handle) = MessageListener::new(orchestrator);

    tracing::info!(mode = ?mode, "spawning message listener");
    let task = tokio::spawn(async move {
        listener.run().await;
    });
    Ok((handle, task))
}

/// Host entry point: logging, `.env`, discovered config (defaults on error), start.
pub fn bootstrap(
    doc: Arc<dyn Document>,
    mode: RuntimeMode,
) -> InjectorResult<(InjectorHandle, JoinHandle<()>)> {
    init_tracing();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    start(doc, config::load_config_or_default(), mode)
}
