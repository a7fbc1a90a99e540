// Copyright 2024 Cloudflare, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hash map based in memory cache
//!
//! Entries are kept as [Arc] snapshots: a lookup that races with a store sees either the old or
//! the new entry, never a mix of the two.

use super::*;
use crate::hashtable::ConcurrentHashTable;
use crate::key::CacheHashKey;

use async_trait::async_trait;
use deproxy_error::Result;
use log::trace;
use std::any::Any;
use std::sync::Arc;

const N_SHARDS: usize = 16;

/// Hash map based in memory cache
pub struct MemCache {
    cached: ConcurrentHashTable<Arc<CacheEntry>, N_SHARDS>,
}

impl MemCache {
    /// Create a new [MemCache]
    pub fn new() -> Self {
        MemCache {
            cached: ConcurrentHashTable::new(),
        }
    }

    /// The number of stored entries
    pub fn len(&self) -> usize {
        self.cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        let hash = key.primary_u128();
        // a hash collision is a miss rather than somebody else's response
        Ok(self
            .cached
            .get_cloned(hash)
            .filter(|entry| entry.key == *key))
    }

    async fn store(&self, key: &CacheKey, entry: CacheEntry) -> Result<()> {
        let hash = key.primary_u128();
        trace!("storing {key}");
        self.cached.write(hash).insert(hash, Arc::new(entry));
        Ok(())
    }

    async fn purge(&self, key: &CacheKey) -> Result<bool> {
        let hash = key.primary_u128();
        let mut table = self.cached.write(hash);
        if table.get(&hash).map_or(false, |entry| entry.key == *key) {
            table.remove(&hash);
            return Ok(true);
        }
        Ok(false)
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}
