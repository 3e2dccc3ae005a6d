//! Ordered set of JSON-RPC endpoints with exactly one active connection.
//! Failover walks the list round-robin; there is no backoff here, callers
//! decide when to retry.

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ConfigError, TransportError};

/// Establishes a provider for an endpoint URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<DynProvider, TransportError>;
}

/// Plain HTTP JSON-RPC transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, url: &Url) -> Result<DynProvider, TransportError> {
        Ok(ProviderBuilder::new().connect_http(url.clone()).erased())
    }
}

struct ActiveEndpoint {
    index: usize,
    provider: DynProvider,
}

pub struct RpcManager {
    urls: Vec<Url>,
    connector: Arc<dyn Connector>,
    active: RwLock<ActiveEndpoint>,
    failover: Mutex<()>,
}

impl std::fmt::Debug for RpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcManager")
            .field("urls", &self.urls)
            .field("active_index", &self.active_index())
            .finish_non_exhaustive()
    }
}

impl RpcManager {
    /// Connects to the first endpoint, in list order, that answers
    /// `eth_blockNumber`.
    pub async fn connect(
        urls: Vec<Url>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        for (index, url) in urls.iter().enumerate() {
            match probe(connector.as_ref(), url).await {
                Ok(provider) => {
                    info!("Connected to RPC endpoint #{index} ({})", redact(url));
                    return Ok(Self {
                        active: RwLock::new(ActiveEndpoint { index, provider }),
                        urls,
                        connector,
                        failover: Mutex::new(()),
                    });
                }
                Err(error) => {
                    warn!("RPC endpoint #{index} ({}) unreachable: {error}", redact(url));
                }
            }
        }

        Err(ConfigError::NoReachableEndpoint { tried: urls.len() })
    }

    /// Handle to the active connection.
    pub fn current(&self) -> DynProvider {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .provider
            .clone()
    }

    pub fn active_index(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
    }

    pub fn endpoint_count(&self) -> usize {
        self.urls.len()
    }

    /// Moves to the next reachable endpoint after the active one, wrapping
    /// around. A full cycle is attempted; with a single URL this reconnects
    /// to it. Requests issued on the previous handle are not carried over.
    pub async fn fail_over(&self) -> Result<usize, ConfigError> {
        let _guard = self.failover.lock().await;
        let from = self.active_index();
        let count = self.urls.len();

        for step in 1..=count {
            let index = (from + step) % count;
            let url = &self.urls[index];

            match probe(self.connector.as_ref(), url).await {
                Ok(provider) => {
                    warn!(
                        "Failing over RPC endpoint #{from} ({}) -> #{index} ({})",
                        redact(&self.urls[from]),
                        redact(url)
                    );
                    *self.active.write().unwrap_or_else(PoisonError::into_inner) =
                        ActiveEndpoint { index, provider };
                    return Ok(index);
                }
                Err(error) => {
                    debug!("Failover candidate #{index} ({}) unreachable: {error}", redact(url));
                }
            }
        }

        Err(ConfigError::NoReachableEndpoint { tried: count })
    }
}

async fn probe(connector: &dyn Connector, url: &Url) -> Result<DynProvider, TransportError> {
    let provider = connector.connect(url).await?;
    let head = provider.get_block_number().await?;
    debug!("Liveness check passed for {} at block {head}", redact(url));
    Ok(provider)
}

/// Endpoint URL without path or query, which commonly carry API keys.
fn redact(url: &Url) -> String {
    url.host_str().map_or_else(
        || url.scheme().to_string(),
        |host| format!("{}://{host}", url.scheme()),
    )
}
