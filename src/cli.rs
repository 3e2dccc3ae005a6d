use alloy::primitives::{Address, I256, address};
use clap::{Parser, Subcommand};
use evm_indexer_store::{Pool, SkippedChunk, Swap, Token, Transfer};
use sqlx::SqlitePool;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::Indexer;
use crate::amount::{DEFAULT_DECIMALS, format_amount_str};
use crate::contracts::load_contracts;
use crate::env::{LogLevel, ScanEnv};
use crate::handlers::{SwapDirection, short_address};
use crate::rpc::{HttpConnector, RpcManager};
use crate::scanner::{LogScanner, ScanCursor, chain_head};
use crate::swap_search::{FoundSwap, SwapQuery, SwapRole, find_swaps};

/// Transfers to this address are burns and left out of reports.
pub const DEAD_ADDRESS: Address = address!("0x000000000000000000000000000000000000dEaD");

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Pool {0} has not been indexed")]
    UnknownPool(Address),
    #[error("Invalid block range: {from_block} is after {to_block}")]
    InvalidRange { from_block: u64, to_block: u64 },
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List transfers sent by an address, oldest first
    Transfers {
        #[arg(long)]
        from: Address,
    },
    /// Show the latest indexed swaps of a pool, newest first
    Swaps {
        #[arg(long)]
        pool: Address,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Search pools for a user's swaps directly on chain
    FindSwaps {
        /// Comma separated pool addresses
        #[arg(long, value_delimiter = ',', required = true)]
        pools: Vec<Address>,
        #[arg(long)]
        user: Option<Address>,
        #[arg(long, value_enum, default_value = "any")]
        role: SwapRole,
        #[arg(long, default_value = "0")]
        from_block: u64,
        /// Defaults to the chain head
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// List chunks that were skipped after exhausting retries
    Skipped,
    /// Re-scan skipped chunks and clear the ones that now succeed
    ReplaySkipped,
}

#[derive(Debug, Parser)]
#[command(name = "cli")]
#[command(about = "Query and maintain the EVM event index")]
#[command(version)]
pub struct CliEnv {
    #[clap(long = "db", env, default_value = "sqlite://events.sqlite3")]
    pub database_url: String,
    #[clap(long, env, default_value = "info")]
    pub log_level: LogLevel,
    /// Comma separated JSON-RPC endpoints; only needed by on-chain commands
    #[clap(long, env, value_delimiter = ',')]
    pub rpc_urls: Vec<Url>,
    #[clap(long, env, default_value = "config/contracts.json")]
    pub contracts_config: PathBuf,
    #[clap(flatten)]
    pub scan: ScanEnv,
    #[command(subcommand)]
    pub command: Commands,
}

pub async fn run(cli_env: CliEnv) -> anyhow::Result<()> {
    let db = evm_indexer_store::connect(&cli_env.database_url).await?;
    run_command_with_writers(&cli_env, &cli_env.command, &db, &mut std::io::stdout()).await
}

async fn run_command_with_writers<W: Write>(
    cli_env: &CliEnv,
    command: &Commands,
    db: &SqlitePool,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Transfers { from } => print_transfers(db, *from, stdout).await?,
        Commands::Swaps { pool, limit } => print_swaps(db, *pool, *limit, stdout).await?,
        Commands::FindSwaps {
            pools,
            user,
            role,
            from_block,
            to_block,
        } => {
            let rpc = connect_rpc(cli_env).await?;
            let config = cli_env.scan.scan_config();
            let to_block = match to_block {
                Some(to_block) => *to_block,
                None => chain_head(&rpc, &config).await?,
            };
            if *from_block > to_block {
                return Err(CliError::InvalidRange {
                    from_block: *from_block,
                    to_block,
                }
                .into());
            }

            let query = SwapQuery {
                pools: pools.clone(),
                user: *user,
                role: *role,
                from_block: *from_block,
                to_block,
            };
            let swaps = find_swaps(&rpc, &config, &query).await;
            print_found_swaps(&swaps, stdout)?;
        }
        Commands::Skipped => print_skipped(db, stdout).await?,
        Commands::ReplaySkipped => {
            let rpc = connect_rpc(cli_env).await?;
            let contracts = load_contracts(&cli_env.contracts_config)?;
            let indexer = Indexer::wire(db.clone(), rpc, &contracts)?;
            let scanner = LogScanner::new(
                indexer.rpc,
                indexer.dispatcher,
                indexer.db,
                ScanCursor::new(0, 0),
                cli_env.scan.scan_config(),
            );

            let report = scanner.replay_skipped().await?;
            writeln!(
                stdout,
                "Replayed {} chunk(s); {} still failing",
                report.replayed, report.still_failing
            )?;
        }
    }

    info!("CLI operation completed successfully");
    Ok(())
}

async fn connect_rpc(cli_env: &CliEnv) -> anyhow::Result<Arc<RpcManager>> {
    let rpc = RpcManager::connect(cli_env.rpc_urls.clone(), Arc::new(HttpConnector)).await?;
    Ok(Arc::new(rpc))
}

async fn print_transfers<W: Write>(
    db: &SqlitePool,
    from: Address,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let transfers = Transfer::sent_by(db, from).await?;
    let mut shown = 0;

    for row in transfers.iter().filter(|row| row.transfer.to != DEAD_ADDRESS) {
        let decimals = row.token_decimals.unwrap_or(DEFAULT_DECIMALS);
        let symbol = row
            .token_symbol
            .clone()
            .unwrap_or_else(|| short_address(row.token_address));

        writeln!(
            stdout,
            "block {} | {} | {} {} -> {}",
            row.transfer.block_number,
            row.transfer.tx_hash,
            render_amount(&row.transfer.value_raw, decimals),
            symbol,
            row.transfer.to,
        )?;
        shown += 1;
    }

    writeln!(stdout, "{shown} transfer(s) from {from}")?;
    Ok(())
}

async fn print_swaps<W: Write>(
    db: &SqlitePool,
    pool_address: Address,
    limit: u32,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let pool = Pool::find_by_address(db, pool_address)
        .await?
        .ok_or(CliError::UnknownPool(pool_address))?;
    let (token0, token1) = pool.tokens(db).await?;

    for swap in Swap::latest_for_pool(db, pool.id, limit).await? {
        writeln!(stdout, "{}", describe_swap(&swap, &token0, &token1))?;
    }

    Ok(())
}

fn describe_swap(swap: &Swap, token0: &Token, token1: &Token) -> String {
    let direction = match (
        I256::from_dec_str(&swap.amount0_raw),
        I256::from_dec_str(&swap.amount1_raw),
    ) {
        (Ok(amount0), Ok(amount1)) => SwapDirection::from_amounts(amount0, amount1),
        _ => SwapDirection::Unknown,
    };

    format!(
        "block {} | {} | {direction} | {} {} | {} {}",
        swap.block_number,
        swap.tx_hash,
        render_amount(&swap.amount0_raw, token0.decimals.unwrap_or(DEFAULT_DECIMALS)),
        token_label(token0),
        render_amount(&swap.amount1_raw, token1.decimals.unwrap_or(DEFAULT_DECIMALS)),
        token_label(token1),
    )
}

fn token_label(token: &Token) -> String {
    token
        .symbol
        .clone()
        .unwrap_or_else(|| short_address(token.address))
}

fn print_found_swaps<W: Write>(swaps: &[FoundSwap], stdout: &mut W) -> std::io::Result<()> {
    for swap in swaps {
        writeln!(
            stdout,
            "block {} | {} | pool {} | {} -> {} | a0={} a1={} | {}",
            swap.block_number,
            swap.tx_hash,
            swap.pool,
            swap.sender,
            swap.recipient,
            swap.amount0,
            swap.amount1,
            SwapDirection::from_amounts(swap.amount0, swap.amount1),
        )?;
    }

    writeln!(stdout, "{} swap(s) found", swaps.len())
}

async fn print_skipped<W: Write>(db: &SqlitePool, stdout: &mut W) -> anyhow::Result<()> {
    let skipped = SkippedChunk::all(db).await?;

    for chunk in &skipped {
        writeln!(
            stdout,
            "{} | blocks {}-{} | {}",
            chunk.contract, chunk.from_block, chunk.to_block, chunk.reason
        )?;
    }

    writeln!(stdout, "{} skipped chunk(s)", skipped.len())?;
    Ok(())
}

/// Human readable amount for a signed or unsigned raw decimal string. Falls
/// back to the raw text when it does not parse.
fn render_amount(raw: &str, decimals: u8) -> String {
    let (sign, magnitude) = raw.strip_prefix('-').map_or(("", raw), |rest| ("-", rest));

    format_amount_str(magnitude, decimals)
        .map_or_else(|_| raw.to_string(), |formatted| format!("{sign}{formatted}"))
}
