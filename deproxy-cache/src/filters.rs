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

//! Utility functions to decide what a shared cache may store

use deproxy_error::Result;
use deproxy_http::{header, Request, Response};
use log::debug;
use strum::IntoStaticStr;

use crate::cache_control::{CacheControl, Cacheable, InterpretCacheControl};
use crate::conf::CacheConf;

/// Why a response is not stored
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum NotStorableReason {
    /// The request method is not one of the cached methods
    Method,
    /// The request has `no-store`
    RequestNoStore,
    /// The response has `no-store`, `private` or `no-cache`
    OriginNotCache,
    /// The request has `Authorization` and the response does not allow sharing it
    Authorization,
    /// 1xx, 206, 304 and 5xx responses are never stored
    Status,
}

impl NotStorableReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug)]
pub enum Storability {
    /// The response as it should be stored
    Storable(Response),
    NotStorable(NotStorableReason),
}

/// Decide if the request can be cacheable
pub fn request_cacheable(req: &Request, conf: &CacheConf) -> bool {
    conf.is_cache_method(req.method.as_str())
}

fn status_storable(status: u16) -> bool {
    !matches!(status, 100..=199 | 206 | 304 | 500..=599)
}

/// Decide if `resp`, the answer to `req`, may be stored.
///
/// `req_cc` and `resp_cc` are the directives of the two messages with the ignored names already
/// removed. The stored copy loses `Set-Cookie`, the headers of `cache_resp_hdr_del` and the
/// fields named by `private="..."` or `no-cache="..."`.
///
/// Fails if the response repeats `stale-if-error`.
pub fn storable(
    req: &Request,
    req_cc: &CacheControl,
    resp: &Response,
    resp_cc: &CacheControl,
    conf: &CacheConf,
) -> Result<Storability> {
    use NotStorableReason::*;
    use Storability::*;

    resp_cc.check_response()?;

    let reason = if !request_cacheable(req, conf) {
        Some(Method)
    } else if req_cc.no_store() {
        Some(RequestNoStore)
    } else if resp_cc.is_cacheable() == Cacheable::No {
        Some(OriginNotCache)
    } else if req.headers.contains(header::AUTHORIZATION)
        && !resp_cc.allow_caching_authorized_req()
    {
        // RFC 9111 §3.5
        Some(Authorization)
    } else if !status_storable(resp.status) {
        Some(Status)
    } else {
        None
    };
    if let Some(reason) = reason {
        debug!("not storing {} {}: {}", req.method, req.uri, reason.as_str());
        return Ok(NotStorable(reason));
    }

    let mut stored = resp.clone();
    stored.headers.delete_all(header::SET_COOKIE);
    for name in conf.cache_resp_hdr_del.iter() {
        stored.headers.delete_all(name);
    }
    resp_cc.strip_private_headers(&mut stored.headers);
    Ok(Storable(stored))
}
