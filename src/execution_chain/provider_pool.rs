//! Provider Pool
//! =============
//! One handle per configured execution node. A handle owns the memo caches for its node, so
//! two nodes never share cached chain data. All nodes must pass a liveness check before a
//! run starts.

use std::sync::{Arc, Mutex};

use cached::{Cached, SizedCache};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::env::obfuscate_url;

use super::{BlockNumber, ExecutionNodeHttp, ExecutionProvider};

const BLOCK_TIMESTAMP_CACHE_SIZE: usize = 100_000;
const LOCATED_BLOCK_CACHE_SIZE: usize = 10_000;

pub type DynExecutionProvider = Arc<dyn ExecutionProvider + Send + Sync>;

/// A node together with a name that is safe to log.
pub struct NamedProvider {
    pub name: String,
    pub node: DynExecutionProvider,
}

impl NamedProvider {
    pub fn new(name: &str, node: DynExecutionProvider) -> Self {
        Self {
            name: name.to_string(),
            node,
        }
    }

    pub fn http(url: &str) -> Self {
        Self::new(&obfuscate_url(url), Arc::new(ExecutionNodeHttp::new(url)))
    }
}

pub struct Provider {
    name: String,
    node: DynExecutionProvider,
    block_timestamps: Mutex<SizedCache<BlockNumber, i64>>,
    located_blocks: Mutex<SizedCache<i64, BlockNumber>>,
}

impl Provider {
    pub fn new(NamedProvider { name, node }: NamedProvider) -> Self {
        Self {
            name,
            node,
            block_timestamps: Mutex::new(SizedCache::with_size(BLOCK_TIMESTAMP_CACHE_SIZE)),
            located_blocks: Mutex::new(SizedCache::with_size(LOCATED_BLOCK_CACHE_SIZE)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &(dyn ExecutionProvider + Send + Sync) {
        self.node.as_ref()
    }

    pub fn cached_block_timestamp(&self, block_number: BlockNumber) -> Option<i64> {
        self.block_timestamps
            .lock()
            .unwrap()
            .cache_get(&block_number)
            .copied()
    }

    pub fn cache_block_timestamp(&self, block_number: BlockNumber, timestamp: i64) {
        self.block_timestamps
            .lock()
            .unwrap()
            .cache_set(block_number, timestamp);
    }

    pub fn cached_located_block(&self, target_timestamp: i64) -> Option<BlockNumber> {
        self.located_blocks
            .lock()
            .unwrap()
            .cache_get(&target_timestamp)
            .copied()
    }

    pub fn cache_located_block(&self, target_timestamp: i64, block_number: BlockNumber) {
        self.located_blocks
            .lock()
            .unwrap()
            .cache_set(target_timestamp, block_number);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("no execution providers configured")]
    NoProviders,
    #[error("failed to connect to execution providers: {}", .0.join(", "))]
    Unreachable(Vec<String>),
}

pub struct ProviderPool {
    providers: Vec<Arc<Provider>>,
}

impl ProviderPool {
    /// Checks every node concurrently. Any unreachable node fails the whole pool, we don't run
    /// on a partial set of providers.
    pub async fn connect(nodes: Vec<NamedProvider>) -> Result<Self, ConnectivityError> {
        if nodes.is_empty() {
            return Err(ConnectivityError::NoProviders);
        }

        let reachable = join_all(nodes.iter().map(|named| named.node.is_reachable())).await;

        let unreachable: Vec<String> = nodes
            .iter()
            .zip(reachable.iter())
            .filter(|(_, reachable)| !**reachable)
            .map(|(named, _)| named.name.clone())
            .collect();

        if !unreachable.is_empty() {
            return Err(ConnectivityError::Unreachable(unreachable));
        }

        let providers: Vec<Arc<Provider>> = nodes
            .into_iter()
            .map(|named| Arc::new(Provider::new(named)))
            .collect();

        for provider in providers.iter() {
            debug!(provider = provider.name(), "execution provider reachable");
        }
        info!(count = providers.len(), "connected to execution providers");

        Ok(Self { providers })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Round-robin assignment of providers to workers.
    pub fn assign(&self, worker_index: usize) -> Arc<Provider> {
        self.providers[worker_index % self.providers.len()].clone()
    }
}
