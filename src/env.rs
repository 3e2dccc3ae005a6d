use clap::Parser;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::scanner::{ScanConfig, StartPolicy};
use crate::telemetry::{OtlpSettings, TelemetryGuard, setup_telemetry};

#[derive(clap::ValueEnum, Debug, Clone)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        (&log_level).into()
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RpcEnv {
    /// Comma separated JSON-RPC endpoints, tried in order
    #[clap(long, env, value_delimiter = ',', required = true)]
    pub rpc_urls: Vec<Url>,
    /// JSON file listing tracked contracts, their ABI files and handlers
    #[clap(long, env, default_value = "config/contracts.json")]
    pub contracts_config: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct ScanEnv {
    /// Absolute block to start from; overrides BLOCKS_BACK
    #[clap(long, env)]
    pub start_block: Option<u64>,
    /// Start this many blocks below the head when no start block is given
    #[clap(long, env, default_value = "9999")]
    pub blocks_back: u64,
    #[clap(long, env, default_value = "2000")]
    pub chunk_size: u64,
    /// Idle delay in seconds once the scan has caught up with the head
    #[clap(long, env, default_value = "5")]
    pub poll_interval_secs: u64,
    #[clap(long, env, default_value = "3")]
    pub max_retries: usize,
    #[clap(long, env, default_value = "500")]
    pub initial_backoff_ms: u64,
    #[clap(long, env, default_value = "30000")]
    pub max_backoff_ms: u64,
    /// Upper bound of the random pause between chunks
    #[clap(long, env, default_value = "0")]
    pub chunk_jitter_ms: u64,
    #[clap(long, env, default_value = "main")]
    pub cursor_name: String,
    /// Continue from the persisted cursor when one exists
    #[clap(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub resume: bool,
}

impl ScanEnv {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            chunk_size: self.chunk_size.max(1),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            chunk_jitter: Duration::from_millis(self.chunk_jitter_ms),
            cursor_name: self.cursor_name.clone(),
        }
    }

    pub const fn start_policy(&self) -> StartPolicy {
        StartPolicy {
            start_block: self.start_block,
            blocks_back: self.blocks_back,
            resume: self.resume,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Env {
    #[clap(long = "db", env, default_value = "sqlite://events.sqlite3")]
    pub database_url: String,
    #[clap(long, env, default_value = "info")]
    pub log_level: LogLevel,
    #[clap(flatten)]
    pub rpc: RpcEnv,
    #[clap(flatten)]
    pub scan: ScanEnv,
    /// HyperDX API key for telemetry export (optional)
    #[clap(long, env)]
    pub hyperdx_api_key: Option<String>,
    /// Service name for HyperDX identification
    #[clap(long, env, default_value = "evm-indexer")]
    pub hyperdx_service_name: String,
    /// OTLP/HTTP traces endpoint spans are exported to
    #[clap(long, env, default_value = "https://in-otel.hyperdx.io/v1/traces")]
    pub otlp_endpoint: Url,
    /// Reported as the `deployment.environment` resource attribute
    #[clap(long, env, default_value = "development")]
    pub deployment_environment: String,
}

impl Env {
    pub async fn get_sqlite_pool(&self) -> Result<SqlitePool, evm_indexer_store::StoreError> {
        evm_indexer_store::connect(&self.database_url).await
    }

    /// Span export settings; `None` unless an API key is configured.
    pub fn otlp_settings(&self) -> Option<OtlpSettings> {
        let api_key = self.hyperdx_api_key.clone()?;

        Some(OtlpSettings {
            endpoint: self.otlp_endpoint.clone(),
            api_key,
            service_name: self.hyperdx_service_name.clone(),
            environment: self.deployment_environment.clone(),
        })
    }
}

fn default_filter(log_level: &LogLevel) -> String {
    let level: Level = log_level.into();
    format!("evm_indexer={level},evm_indexer_store={level},cli={level}")
}

fn env_filter(log_level: &LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into())
}

/// Console logging, plus OTLP export when an API key is configured. The
/// returned guard must be held for the lifetime of the process.
pub fn setup_tracing(env: &Env) -> Option<TelemetryGuard> {
    let Some(settings) = env.otlp_settings() else {
        setup_console_tracing(&env.log_level);
        return None;
    };

    match setup_telemetry(&settings, env_filter(&env.log_level)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to set up telemetry: {e}, falling back to console logging");
            setup_console_tracing(&env.log_level);
            None
        }
    }
}

pub fn setup_console_tracing(log_level: &LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .compact()
        .init();
}
