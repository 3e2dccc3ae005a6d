use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub mod amount;
mod bindings;
pub mod cli;
pub mod contracts;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod rpc;
pub mod scanner;
pub mod signature;
pub mod swap_search;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

pub use env::{Env, LogLevel};

use crate::contracts::{TrackedContract, load_contracts};
use crate::dispatch::Dispatcher;
use crate::handlers::register_handlers;
use crate::metadata::MetadataResolver;
use crate::rpc::{HttpConnector, RpcManager};
use crate::signature::SignatureIndex;

/// Everything the scan loop needs, wired from configuration. Building it
/// performs every fatal check: contract config, ABIs, handler coverage and
/// RPC reachability.
pub struct Indexer {
    pub db: SqlitePool,
    pub rpc: Arc<RpcManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub resolver: Arc<MetadataResolver>,
}

impl Indexer {
    pub async fn build(env: &Env) -> anyhow::Result<Self> {
        let db = env.get_sqlite_pool().await?;
        let contracts = load_contracts(&env.rpc.contracts_config)?;
        let rpc = Arc::new(
            RpcManager::connect(env.rpc.rpc_urls.clone(), Arc::new(HttpConnector)).await?,
        );

        Ok(Self::wire(db, rpc, &contracts)?)
    }

    pub fn wire(
        db: SqlitePool,
        rpc: Arc<RpcManager>,
        contracts: &[TrackedContract],
    ) -> Result<Self, error::ConfigError> {
        let index = Arc::new(SignatureIndex::build(contracts)?);
        let resolver = Arc::new(MetadataResolver::new(rpc.clone(), db.clone()));

        let mut dispatcher = Dispatcher::new(index);
        register_handlers(&mut dispatcher, contracts, &resolver)?;

        Ok(Self {
            db,
            rpc,
            dispatcher: Arc::new(dispatcher),
            resolver,
        })
    }
}

/// Runs the indexer until Ctrl-C. Configuration failures are returned before
/// the loop starts; nothing after that point ends the process.
pub async fn launch(env: Env) -> anyhow::Result<()> {
    let indexer = Indexer::build(&env).await?;

    let mut scanner = scanner::LogScanner::start(
        indexer.rpc.clone(),
        indexer.dispatcher.clone(),
        indexer.db.clone(),
        env.scan.scan_config(),
        env.scan.start_policy(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal, shutting down gracefully..."),
            Err(e) => error!("Failed to listen for shutdown signal: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    scanner.run(shutdown_rx).await;

    info!("Shutdown complete");
    Ok(())
}
