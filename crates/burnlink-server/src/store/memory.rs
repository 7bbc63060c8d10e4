//! In-memory [`SecretStore`].
//!
//! Records live in a fixed set of shards, each a `HashMap` behind its own
//! mutex. An id always maps to the same shard, so the consume-and-delete in
//! `get` only excludes callers that hash to that shard. Nothing survives a
//! restart.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{
    validate_new, Clock, NewSecret, Result, SecretRecord, SecretStore, StoreError, SystemClock,
};

const DEFAULT_SHARDS: usize = 16;

type Shard = Mutex<HashMap<String, SecretRecord>>;

pub struct MemoryStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_shards(DEFAULT_SHARDS, clock)
    }

    pub fn with_shards(count: usize, clock: Arc<dyn Clock>) -> Self {
        let shards = (0..count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
            clock,
        }
    }

    fn shard(&self, id: &str) -> &Shard {
        let idx = self.hasher.hash_one(id) as usize % self.shards.len();
        &self.shards[idx]
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemoryStore {
    fn put(&self, id: &str, secret: NewSecret) -> Result<SecretRecord> {
        validate_new(id, &secret)?;
        let now_ms = self.clock.now_millis();
        let now = now_ms.div_euclid(1000);

        let mut map = self.shard(id).lock();
        if let Some(existing) = map.get(id) {
            if !existing.is_expired(now) {
                return Err(StoreError::DuplicateId);
            }
            debug!(id = %id, "replacing expired record");
        }
        let record = secret.into_record(id, now_ms);
        map.insert(id.to_owned(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<SecretRecord> {
        let now = self.clock.now();

        let mut map = self.shard(id).lock();
        let (expired, view_once) = match map.get(id) {
            None => return Err(StoreError::NotFound),
            Some(r) => (r.is_expired(now), r.view_once),
        };

        if expired {
            map.remove(id);
            debug!(id = %id, "lazy-evicted expired secret");
            return Err(StoreError::NotFound);
        }

        if view_once {
            // Removal and hand-off happen under the same lock.
            let record = map.remove(id).ok_or(StoreError::NotFound)?;
            debug!(id = %id, "burned after read");
            return Ok(record);
        }

        map.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.shard(id).lock().remove(id);
        Ok(())
    }

    fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut map = shard.lock();
            let before = map.len();
            map.retain(|_, r| !r.is_expired(now));
            removed += before - map.len();
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.shards.iter().map(|s| s.lock().len()).sum())
    }
}
