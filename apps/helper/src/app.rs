//! Builds the worker from the configuration and serves it.

use std::sync::Arc;

use anyhow::Context;
use pacnotify_engine::EngineFactory;
use pacnotify_engine::scripted::{Scenario, ScriptedFactory};
use pacnotify_worker::{PeerAuthority, Worker, WorkerHandler, WorkerServer};
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, HelperConfig};

/// Creates the engine factory selected by `config`.
pub fn engine_factory(config: &EngineConfig) -> anyhow::Result<Arc<dyn EngineFactory>> {
    match config {
        EngineConfig::Scripted { scenario } => {
            let scenario = match scenario {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    toml::from_str::<Scenario>(&text)
                        .with_context(|| format!("failed to parse {}", path.display()))?
                }
                None => Scenario::default(),
            };
            tracing::info!(
                databases = scenario.databases.len(),
                "using scripted engine"
            );
            Ok(Arc::new(ScriptedFactory::new(scenario)))
        }
    }
}

/// Serves the worker until `shutdown` is cancelled or, with
/// `exit_when_released`, until the client is done with it.
pub async fn serve(config: HelperConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let factory = engine_factory(&config.engine)?;
    let authority = Arc::new(PeerAuthority::new(config.grants.clone()));
    let worker = Arc::new(Worker::new(factory, authority));
    let handler = WorkerHandler::new(worker, shutdown.clone())
        .exit_when_released(config.exit_when_released);

    let server = WorkerServer::new(config.server(), Arc::new(handler), shutdown);
    server.run().await.context("worker server failed")?;
    tracing::info!("helper stopped");
    Ok(())
}
