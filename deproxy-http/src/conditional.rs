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

//! Conditional request (not modified) utilities

use bytes::Bytes;
use http::header::*;

use crate::date::header_as_http_date;
use crate::message::{Request, Response};

/// Evaluate `If-None-Match` and `If-Modified-Since` of `req` against a stored `resp`.
///
/// Returns true if the request should receive 304 Not Modified.
/// See <https://datatracker.ietf.org/doc/html/rfc9110#name-precedence-of-preconditions>.
pub fn not_modified_filter(req: &Request, resp: &Response) -> bool {
    // only a 200 can be validated
    if resp.status != 200 {
        return false;
    }

    if req.headers.contains(IF_NONE_MATCH) {
        // If-Modified-Since is ignored when If-None-Match is present
        return resp.headers.get(ETAG).map_or(false, |etag| {
            req.headers
                .find_all(IF_NONE_MATCH)
                .any(|inm| weak_validate_etag(inm, etag))
        });
    }

    if !matches!(req.method.as_str(), "GET" | "HEAD") {
        return false;
    }
    match (
        header_as_http_date(&req.headers, IF_MODIFIED_SINCE),
        header_as_http_date(&resp.headers, LAST_MODIFIED),
    ) {
        (Ok(Some(since)), Ok(Some(last_modified))) => since >= last_modified,
        _ => false,
    }
}

// Split an entity-tag list on the commas that are not inside a quoted tag.
fn etag_list(header: &str) -> impl Iterator<Item = &str> {
    let mut in_quotes = false;
    header
        .split(move |c: char| {
            if c == '"' {
                in_quotes = !in_quotes;
            }
            c == ',' && !in_quotes
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn strip_weak_prefix(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}

/// Whether the entity-tag list `if_none_match` contains `target_etag` under weak comparison
/// (RFC 9110 §8.8.3.2). `*` matches anything.
pub fn weak_validate_etag(if_none_match: &str, target_etag: &str) -> bool {
    if if_none_match.trim() == "*" {
        return true;
    }
    let target = strip_weak_prefix(target_etag.trim());
    etag_list(if_none_match).any(|etag| strip_weak_prefix(etag) == target)
}

/// Turn a stored response into the 304 Not Modified answering a conditional request.
pub fn to_304(resp: &mut Response) {
    resp.status = 304;
    resp.reason = "Not Modified".to_string();
    for name in [
        CONTENT_LENGTH,
        CONTENT_TYPE,
        TRANSFER_ENCODING,
        CONTENT_ENCODING,
        ACCEPT_RANGES,
    ] {
        resp.headers.delete_all(name);
    }
    resp.body = Bytes::new();
    resp.trailer.clear();
}
