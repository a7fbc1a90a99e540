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

//! An RFC 9111 shared cache for proxies.
//!
//! The heart of this crate is [freshness::evaluate()], a pure function deciding whether a stored
//! response can answer a request. Around it:
//! * [cache_control] parses `Cache-Control` directives
//! * [filters] decides what may be stored
//! * [Storage] and [MemCache] hold the entries
//! * [lock] collapses concurrent misses on one key
//! * [forward] talks to the upstream
//! * [CacheService] drives all of the above for one request, and answers `PURGE`

#![allow(clippy::new_without_default)]

pub mod cache_control;
pub mod conf;
pub mod filters;
pub mod forward;
pub mod freshness;
pub mod hashtable;
pub mod key;
pub mod lock;
mod memory;
pub mod meta;
pub mod service;
pub mod storage;

pub use conf::CacheConf;
pub use forward::{Forward, TcpForwarder};
pub use freshness::{evaluate, Freshness, FreshnessInput, MissReason, Verdict};
pub use key::CacheKey;
pub use memory::MemCache;
pub use meta::CacheEntry;
pub use service::CacheService;
pub use storage::Storage;

pub mod prelude {
    pub use crate::cache_control::{CacheControl, InterpretCacheControl};
    pub use crate::{CacheConf, CacheEntry, CacheKey, CacheService, Storage, Verdict};
}
