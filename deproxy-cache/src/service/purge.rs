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

//! `PURGE`: evict a resource, optionally fetching it again right away

use super::*;

use std::net::IpAddr;

pub const PURGE: &str = "PURGE";

fn gen_purge_response(code: u16) -> Result<Response> {
    let mut resp = empty_response(code)?;
    resp.headers.set(header::CACHE_CONTROL, "private, no-store");
    Ok(resp)
}

impl CacheService {
    fn purge_allowed(&self, client: Option<IpAddr>) -> bool {
        client.map_or(false, |ip| self.purge_acl.iter().any(|net| net.contains(&ip)))
    }

    /// The method to refetch with, if the refresh header names a cached one
    fn refresh_method<'a>(&self, req: &'a Request) -> Option<&'a str> {
        let method = req.headers.get(&self.conf.cache_purge_refresh_header)?;
        self.conf.is_cache_method(method).then_some(method)
    }

    /// Evict every cached method's entry for the target of `req`.
    ///
    /// With the refresh header the resource is then fetched again with the method it names. The
    /// upstream response goes to the client and into the cache if storable.
    pub(super) async fn purge(
        &self,
        req: &Request,
        client: Option<IpAddr>,
        now: Instant,
    ) -> Result<Response> {
        if !self.purge_allowed(client) {
            warn!("purge of {} refused for {client:?}", req.uri);
            return gen_purge_response(403);
        }

        let authority = req.authority().unwrap_or_default().to_ascii_lowercase();
        let mut found = false;
        for method in &self.conf.cache_methods {
            let key = CacheKey::new(method.as_str(), authority.as_str(), req.uri.as_str());
            match self.storage.purge(&key).await {
                Ok(purged) => found |= purged,
                Err(e) => {
                    warn!("Fail to purge cache: {e}, {key}");
                    return gen_purge_response(500);
                }
            }
        }
        debug!("purged {authority}{}: found {found}", req.uri);

        let Some(method) = self.refresh_method(req) else {
            return gen_purge_response(if found { 200 } else { 404 });
        };
        let mut refresh = Request::build(method, req.uri.as_str())?;
        refresh.headers = req.headers.clone();
        refresh.headers.delete_all(header::TRANSFER_ENCODING);
        refresh.headers.delete_all(header::CONTENT_LENGTH);
        let key = CacheKey::from_request(&refresh);
        let req_cc = CacheControl::from_headers_or_default(&refresh.headers);
        let (resp, _) = self.fill(&refresh, &key, &req_cc, None, now).await?;
        Ok(resp)
    }
}
