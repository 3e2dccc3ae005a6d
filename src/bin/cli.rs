use clap::Parser;
use evm_indexer::cli::{self, CliEnv};
use evm_indexer::env::setup_console_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let cli_env = CliEnv::parse();
    setup_console_tracing(&cli_env.log_level);

    cli::run(cli_env).await
}
