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

//! The caching proxy logic
//!
//! [CacheService] answers requests from a [Storage], forwarding through a [Forward] when it
//! has to, and stores what may be stored. Concurrent misses on one key are collapsed into one
//! upstream request with a [CacheKeyLock](crate::lock::CacheKeyLock).

use deproxy_error::{Error, Result};
use deproxy_http::conditional::{not_modified_filter, to_304};
use deproxy_http::{header, Request, Response};
use ipnet::IpNet;
use log::{debug, warn};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::cache_control::CacheControl;
use crate::conf::CacheConf;
use crate::filters::{self, Storability};
use crate::forward::Forward;
use crate::freshness::{
    self, ForwardOutcome, Freshness, FreshnessInput, MissReason, StatusPattern, Verdict,
};
use crate::lock::{CacheKeyLockImpl, CacheLock, LockStatus, Locked};
use crate::storage::Storage;
use crate::{CacheEntry, CacheKey};

mod purge;
pub use purge::PURGE;

/// A stored entry that was judged stale for the current request
type StaleEntry = (Arc<CacheEntry>, Freshness);

pub struct CacheService {
    conf: CacheConf,
    use_stale: Vec<StatusPattern>,
    purge_acl: Vec<IpNet>,
    storage: Arc<dyn Storage>,
    forwarder: Arc<dyn Forward>,
    lock: Box<CacheKeyLockImpl>,
}

/// A response carrying just the status for `e`
pub fn error_response(e: &Error) -> Result<Response> {
    empty_response(e.status_code())
}

fn empty_response(status: u16) -> Result<Response> {
    let mut resp = Response::build(status)?;
    resp.set_body("");
    Ok(resp)
}

impl CacheService {
    /// Create a service with a [CacheLock] that times out after `cache_lock_timeout_ms`.
    pub fn new(
        conf: CacheConf,
        storage: Arc<dyn Storage>,
        forwarder: Arc<dyn Forward>,
    ) -> Result<Self> {
        let lock = CacheLock::new_boxed(conf.cache_lock_timeout());
        Self::with_lock(conf, storage, forwarder, lock)
    }

    pub fn with_lock(
        conf: CacheConf,
        storage: Arc<dyn Storage>,
        forwarder: Arc<dyn Forward>,
        lock: Box<CacheKeyLockImpl>,
    ) -> Result<Self> {
        let use_stale = conf.use_stale_patterns()?;
        let purge_acl = conf.purge_acl()?;
        Ok(CacheService {
            conf,
            use_stale,
            purge_acl,
            storage,
            forwarder,
            lock,
        })
    }

    pub fn conf(&self) -> &CacheConf {
        &self.conf
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Answer `req`
    pub async fn handle(&self, req: Request) -> Result<Response> {
        self.handle_at(req, Instant::now()).await
    }

    /// Answer `req` as if it arrived at `now`.
    ///
    /// Upstream failures become error responses. Errors are returned only when the storage
    /// fails.
    pub async fn handle_at(&self, req: Request, now: Instant) -> Result<Response> {
        self.handle_from(req, None, now).await
    }

    /// Answer `req` from `client` as if it arrived at `now`. The client address is only
    /// consulted for `PURGE`, which is refused without one.
    pub async fn handle_from(
        &self,
        req: Request,
        client: Option<IpAddr>,
        now: Instant,
    ) -> Result<Response> {
        if self.conf.cache_purge && req.method == PURGE {
            return self.purge(&req, client, now).await;
        }
        if !filters::request_cacheable(&req, &self.conf) {
            debug!("not caching method {}", req.method);
            return match self.forwarder.forward(&req).await {
                Ok(resp) => Ok(resp),
                Err(e) => {
                    warn!("forward failed: {e}");
                    error_response(&e)
                }
            };
        }

        let key = CacheKey::from_request(&req);
        let req_cc = CacheControl::from_headers_or_default(&req.headers);
        let only_if_cached = req_cc.filtered(&self.conf.cache_control_ignore).only_if_cached();
        let mut use_lock = true;
        loop {
            let stale = match self.storage.lookup(&key).await? {
                None if only_if_cached => {
                    debug!("{key}: only-if-cached without entry");
                    return empty_response(504);
                }
                None => {
                    debug!("{key}: {}", MissReason::NoEntry.as_str());
                    None
                }
                Some(entry) => {
                    let input = FreshnessInput {
                        request_directives: &req_cc,
                        authorization: req.headers.contains(header::AUTHORIZATION),
                        entry: &entry,
                        ignored: &self.conf.cache_control_ignore,
                    };
                    let freshness = match freshness::evaluate(&input, now) {
                        Ok(f) => f,
                        Err(e) => {
                            warn!("{key}: {e}");
                            return error_response(&e);
                        }
                    };
                    debug!("{key}: age {} {}", freshness.age, freshness.verdict.as_str());
                    match freshness.verdict {
                        Verdict::FreshHit | Verdict::StaleHit => {
                            return Ok(self.emit(&req, &entry, &freshness, freshness.verdict));
                        }
                        Verdict::OnlyIfCachedUnsatisfiable => return empty_response(504),
                        Verdict::StaleIfErrorHit | Verdict::MissForward(_) => {
                            Some((entry, freshness))
                        }
                    }
                }
            };

            if !use_lock {
                let (resp, _) = self.fill(&req, &key, &req_cc, stale.as_ref(), now).await?;
                return Ok(resp);
            }
            match self.lock.lock(&key) {
                Locked::Write(permit) => {
                    let filled = self.fill(&req, &key, &req_cc, stale.as_ref(), now).await;
                    let status = filled
                        .as_ref()
                        .map_or(LockStatus::TransientError, |(_, status)| *status);
                    self.lock.release(&key, permit, status);
                    return filled.map(|(resp, _)| resp);
                }
                Locked::Read(read_lock) => {
                    read_lock.wait().await;
                    let status = read_lock.lock_status();
                    debug!("{key}: fill lock released with {}", status.as_str());
                    // after one wait, a miss goes upstream on its own
                    use_lock = matches!(status, LockStatus::TransientError | LockStatus::Dangling);
                }
            }
        }
    }

    /// The cached response for `verdict`, or a 304 if `req` is conditional and matches it
    fn emit(
        &self,
        req: &Request,
        entry: &CacheEntry,
        freshness: &Freshness,
        verdict: Verdict,
    ) -> Response {
        let mut resp = freshness::cached_response(entry, freshness.age, verdict.is_stale_hit());
        if not_modified_filter(req, &resp) {
            to_304(&mut resp);
        }
        resp
    }

    /// Forward `req` and store the response if allowed. Return the response for the client and
    /// the status to release the fill lock with. Fails only when the storage does.
    async fn fill(
        &self,
        req: &Request,
        key: &CacheKey,
        req_cc: &CacheControl,
        stale: Option<&StaleEntry>,
        now: Instant,
    ) -> Result<(Response, LockStatus)> {
        let result = self.forwarder.forward(req).await;
        let response_time = SystemTime::now();

        if let Some((entry, freshness)) = stale {
            let outcome = match &result {
                Ok(resp) => ForwardOutcome::Status(resp.status),
                Err(e) => ForwardOutcome::Failed(e.status_code()),
            };
            let verdict = freshness.after_forward(outcome, &self.use_stale);
            if verdict == Verdict::StaleIfErrorHit {
                debug!("{key}: serving stale for {outcome:?}");
                return Ok((
                    self.emit(req, entry, freshness, verdict),
                    LockStatus::TransientError,
                ));
            }
        }

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!("{key}: forward failed: {e}");
                return Ok((error_response(&e)?, LockStatus::TransientError));
            }
        };

        let ignored = &self.conf.cache_control_ignore;
        let resp_cc = CacheControl::from_headers_or_default(&resp.headers).filtered(ignored);
        match filters::storable(req, &req_cc.filtered(ignored), &resp, &resp_cc, &self.conf) {
            Err(e) => {
                warn!("{key}: {e}");
                Ok((error_response(&e)?, LockStatus::GiveUp))
            }
            Ok(Storability::NotStorable(_)) => Ok((resp, LockStatus::GiveUp)),
            Ok(Storability::Storable(stored)) => {
                let entry =
                    CacheEntry::new(key.clone(), stored, req_cc.clone(), response_time, now);
                self.storage.store(key, entry).await?;
                Ok((resp, LockStatus::Done))
            }
        }
    }
}
