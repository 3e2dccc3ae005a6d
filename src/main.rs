use clap::Parser;
use evm_indexer::env::setup_tracing;
use evm_indexer::{Env, launch};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let env = Env::try_parse()?;
    let _telemetry_guard = setup_tracing(&env);

    if let Err(e) = launch(env).await {
        error!("Indexer failed to start: {e}");
        return Err(e);
    }

    Ok(())
}
