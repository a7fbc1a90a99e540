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

//! Cache backend storage abstraction

use super::{CacheEntry, CacheKey};

use async_trait::async_trait;
use deproxy_error::Result;
use std::any::Any;
use std::sync::Arc;

/// Cache storage interface
///
/// Entries are handed out as shared snapshots. A store never modifies an entry it returned;
/// [Storage::store()] replaces it.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Lookup the storage for the given [CacheKey]
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>>;

    /// Store `entry` under `key`, replacing any existing entry.
    async fn store(&self, key: &CacheKey, entry: CacheEntry) -> Result<()>;

    /// Delete the cached entry of the given key
    ///
    /// Return `Ok(true)` if an entry was removed.
    async fn purge(&self, key: &CacheKey) -> Result<bool>;

    /// Helper function to cast the trait object to concrete types
    fn as_any(&self) -> &(dyn Any + Send + Sync + 'static);
}
