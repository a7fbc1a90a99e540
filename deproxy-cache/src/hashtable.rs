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

//! Concurrent hash table

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;

/// A hash table keyed by 128 bit key hashes that shards to a constant number of tables to
/// reduce lock contention
pub struct ConcurrentHashTable<V, const N: usize> {
    tables: [RwLock<HashMap<u128, V>>; N],
}

#[inline]
fn get_shard(key: u128, n_shards: usize) -> usize {
    (key % n_shards as u128) as usize
}

impl<V, const N: usize> ConcurrentHashTable<V, N>
where
    [RwLock<HashMap<u128, V>>; N]: Default,
{
    pub fn new() -> Self {
        ConcurrentHashTable {
            tables: Default::default(),
        }
    }

    pub fn get(&self, key: u128) -> &RwLock<HashMap<u128, V>> {
        &self.tables[get_shard(key, N)]
    }

    pub fn read(&self, key: u128) -> RwLockReadGuard<HashMap<u128, V>> {
        self.get(key).read()
    }

    pub fn write(&self, key: u128) -> RwLockWriteGuard<HashMap<u128, V>> {
        self.get(key).write()
    }

    /// The number of values across all shards
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.read().is_empty())
    }
}

impl<V: Clone, const N: usize> ConcurrentHashTable<V, N>
where
    [RwLock<HashMap<u128, V>>; N]: Default,
{
    /// A copy of the value of `key`, without holding the shard lock afterwards
    pub fn get_cloned(&self, key: u128) -> Option<V> {
        self.read(key).get(&key).cloned()
    }
}

impl<V, const N: usize> Default for ConcurrentHashTable<V, N>
where
    [RwLock<HashMap<u128, V>>; N]: Default,
{
    fn default() -> Self {
        Self::new()
    }
}
