//! Checkpoint and lock store.
//!
//! The store is the only state shared between workers and between process
//! instances. Every access is a single get/set/delete of one key; mutual
//! exclusion relies on all readers honoring the lock keys.
//!
//! - `memory`: in-process map, shared by clones
//! - `redis_store`: remote key/value backend

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use std::path::Path;
use tracing::{debug, warn};

use crate::error_handling::ShipResult;

const LOCK_HELD: &str = "1";

/// Key/value backend holding byte offsets and lock markers
pub trait CheckpointStore: Send {
    fn get(&self, key: &str) -> ShipResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ShipResult<()>;
    fn delete(&self, key: &str) -> ShipResult<()>;
    fn keys(&self) -> ShipResult<Vec<String>>;

    /// Last shipped offset; missing or unparseable values read as 0
    fn get_position(&self, file_key: &str) -> ShipResult<u64> {
        Ok(self
            .get(file_key)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0))
    }

    fn set_position(&self, file_key: &str, offset: u64) -> ShipResult<()> {
        self.set(file_key, &offset.to_string())
    }

    fn get_lock(&self, lock_key: &str) -> ShipResult<bool> {
        Ok(self
            .get(lock_key)?
            .map(|v| v.trim() == LOCK_HELD)
            .unwrap_or(false))
    }

    fn set_lock(&self, lock_key: &str) -> ShipResult<()> {
        self.set(lock_key, LOCK_HELD)
    }

    fn clear_lock(&self, lock_key: &str) -> ShipResult<()> {
        self.delete(lock_key)
    }

    /// Advance a file's checkpoint. An offset below the stored one is refused
    /// so checkpoints never move backward; returns whether it was written.
    fn commit_position(&self, file_key: &str, offset: u64) -> ShipResult<bool> {
        let current = self.get_position(file_key)?;
        if offset < current {
            warn!(
                object = "Redis",
                title = "Checkpoint regression",
                "refusing to move {} back from {} to {}",
                file_key,
                current,
                offset
            );
            return Ok(false);
        }
        self.set_position(file_key, offset)?;
        Ok(true)
    }
}

/// Holds a file's processing lock and clears it when dropped, so every exit
/// path of a worker releases the file.
pub struct LockGuard<'a> {
    store: &'a dyn CheckpointStore,
    key: String,
}

impl<'a> LockGuard<'a> {
    /// Take over a lock that was set during discovery
    pub fn adopt(store: &'a dyn CheckpointStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.store.clear_lock(&self.key) {
            Ok(()) => debug!(lock = %self.key, "lock released"),
            Err(e) => warn!(
                object = "Redis",
                title = "Cannot release lock",
                "{}: {}",
                self.key,
                e
            ),
        }
    }
}

/// Delete checkpoint and lock entries whose file no longer exists.
/// Returns the number of deleted keys.
pub fn prune_stale_keys(store: &dyn CheckpointStore, lock_prefix: &str) -> ShipResult<usize> {
    let mut removed = 0;
    for key in store.keys()? {
        let path = key.strip_prefix(lock_prefix).unwrap_or(&key);
        if !Path::new(path).exists() {
            store.delete(&key)?;
            debug!(key = %key, "removed checkpoint of vanished file");
            removed += 1;
        }
    }
    Ok(removed)
}
