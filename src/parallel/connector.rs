//! Per-worker connections to the checkpoint store and the index backend

use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, MemoryStore, RedisStore};
use crate::config::ShipperConfig;
use crate::error_handling::ShipResult;
use crate::publish::{ElasticClient, IndexBackend, MemoryIndex};

/// Opens the connections one worker owns for its lifetime
pub trait Connector: Send + Sync {
    type Store: CheckpointStore + 'static;
    type Backend: IndexBackend + 'static;

    fn checkpoint_store(&self) -> ShipResult<Self::Store>;
    fn index_backend(&self) -> ShipResult<Self::Backend>;
}

/// Redis checkpoints and an Elasticsearch-compatible backend
pub struct LiveConnector {
    config: Arc<ShipperConfig>,
}

impl LiveConnector {
    pub fn new(config: Arc<ShipperConfig>) -> Self {
        Self { config }
    }
}

impl Connector for LiveConnector {
    type Store = RedisStore;
    type Backend = ElasticClient;

    fn checkpoint_store(&self) -> ShipResult<RedisStore> {
        RedisStore::connect(&self.config)
    }

    fn index_backend(&self) -> ShipResult<ElasticClient> {
        ElasticClient::new(&self.config)
    }
}

/// Hands out clones of shared in-memory backends
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub store: MemoryStore,
    pub index: MemoryIndex,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore, index: MemoryIndex) -> Self {
        Self { store, index }
    }
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;
    type Backend = MemoryIndex;

    fn checkpoint_store(&self) -> ShipResult<MemoryStore> {
        Ok(self.store.clone())
    }

    fn index_backend(&self) -> ShipResult<MemoryIndex> {
        Ok(self.index.clone())
    }
}
