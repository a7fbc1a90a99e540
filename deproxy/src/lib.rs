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

#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # deproxy
//!
//! HTTP messages and a shared cache for checking what a caching proxy puts on the wire.
//!
//! # Features
//! - HTTP/1.x and HTTP/2 messages that serialize back to the bytes they were parsed from
//! - Header comparison that tolerates `Date`, `Age` and other volatile fields
//! - An RFC 9111 freshness engine with `stale-if-error`, `max-stale` and `only-if-cached`
//!
//! # features
//! * `cache`: include and export `deproxy_cache` as [cache]. This feature is default on.

/// Error types shared by all the crates
pub mod error {
    pub use deproxy_error::*;
}

/// HTTP message objects that preserve header case, order and body framing
pub mod http {
    pub use deproxy_http::*;
}

#[cfg(feature = "cache")]
#[cfg_attr(docsrs, doc(cfg(feature = "cache")))]
/// Cache-Control parsing, freshness decisions and the cache service
pub mod cache {
    pub use deproxy_cache::*;
}

pub mod prelude {
    pub use deproxy_error::{Error, ErrorType, Result};
    pub use deproxy_http::prelude::*;

    #[cfg(feature = "cache")]
    pub use deproxy_cache::prelude::*;
}
