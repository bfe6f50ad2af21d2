use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::CheckpointStore;
use crate::error_handling::ShipResult;

/// In-process checkpoint store. Clones share the same map, so a clone can
/// stand in for each worker's "connection".
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panicking holder cannot leave the map half-written: every
        // operation is a single insert/remove.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of all entries
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.map().clone()
    }
}

impl CheckpointStore for MemoryStore {
    fn get(&self, key: &str) -> ShipResult<Option<String>> {
        Ok(self.map().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ShipResult<()> {
        self.map().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> ShipResult<()> {
        self.map().remove(key);
        Ok(())
    }

    fn keys(&self) -> ShipResult<Vec<String>> {
        Ok(self.map().keys().cloned().collect())
    }
}
