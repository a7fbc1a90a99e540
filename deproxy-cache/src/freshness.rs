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

//! Decide whether a stored response can answer a request
//!
//! [evaluate()] is a pure function of the request directives, an entry snapshot and the current
//! time. It never touches the store or the network: when it decides to forward, the caller does
//! so and feeds the outcome back through [Freshness::after_forward()], which is where
//! `stale-if-error` and `cache_use_stale` come into play.

use deproxy_error::{Error, ErrorType, Result};
use deproxy_http::expect::STALE_WARNING;
use deproxy_http::{header, Response};
use log::{debug, trace};
use std::str::FromStr;
use std::time::Instant;
use strum::IntoStaticStr;

use crate::cache_control::{CacheControl, InterpretCacheControl};
use crate::meta::CacheEntry;

/// Why a request has to go upstream
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum MissReason {
    /// Nothing is stored under the key
    NoEntry,
    /// The request has `no-store`
    RequestNoStore,
    /// The request has `no-cache`
    RequestNoCache,
    /// The response has `no-store`, `private` or `no-cache`
    NotReusable,
    /// The request has `Authorization` and the response does not allow sharing it
    Authorization,
    /// The response is older than the request's `max-age`
    TooOld,
    /// The response is stale and `must-revalidate`, `proxy-revalidate` or `s-maxage` forbid
    /// serving it
    RevalidationRequired,
    /// The response is stale
    Stale,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// The decision about one request and one entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum Verdict {
    /// Serve the entry
    FreshHit,
    /// Serve the entry although it is stale, the request accepts it
    StaleHit,
    /// Serve the stale entry because forwarding failed
    StaleIfErrorHit,
    /// Forward the request
    MissForward(MissReason),
    /// The request has `only-if-cached` but nothing usable is stored: answer 504
    OnlyIfCachedUnsatisfiable,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether the entry is served
    pub fn is_hit(&self) -> bool {
        matches!(
            self,
            Verdict::FreshHit | Verdict::StaleHit | Verdict::StaleIfErrorHit
        )
    }

    /// Whether the entry is served past its lifetime
    pub fn is_stale_hit(&self) -> bool {
        matches!(self, Verdict::StaleHit | Verdict::StaleIfErrorHit)
    }
}

/// A `cache_use_stale` status pattern: a status code such as `500` or a class such as `5*`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusPattern {
    Exact(u16),
    /// The hundreds digit of the status class
    Class(u16),
}

impl StatusPattern {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusPattern::Exact(s) => *s == status,
            StatusPattern::Class(c) => status / 100 == *c,
        }
    }
}

impl FromStr for StatusPattern {
    type Err = Box<Error>;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::e_explain(
                ErrorType::InvalidConfig,
                format!("invalid status pattern {s:?}"),
            )
        };
        let bytes = s.as_bytes();
        match bytes {
            [c @ b'1'..=b'5', b'*'] => Ok(StatusPattern::Class(u16::from(c - b'0'))),
            [b'1'..=b'5', b'0'..=b'9', b'0'..=b'9'] => match s.parse() {
                Ok(status) => Ok(StatusPattern::Exact(status)),
                Err(_) => invalid(),
            },
            _ => invalid(),
        }
    }
}

/// What forwarding a request produced
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// A parseable response with this status
    Status(u16),
    /// No usable response: the connection failed, timed out or the response did not parse.
    /// Carries the status the failure is answered with, see
    /// [deproxy_error::Error::status_code()].
    Failed(u16),
}

/// Everything [evaluate()] looks at.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessInput<'a> {
    /// The directives of the request, unfiltered
    pub request_directives: &'a CacheControl,
    /// Whether the request carries `Authorization`
    pub authorization: bool,
    pub entry: &'a CacheEntry,
    /// Directive names to treat as absent on both sides
    pub ignored: &'a [String],
}

/// The result of [evaluate()].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    /// The age of the entry in seconds
    pub age: u64,
    /// The freshness lifetime of the entry in seconds
    pub lifetime: u64,
    pub verdict: Verdict,
    /// How long past its lifetime the entry may replace a failed forward, in seconds. `None`
    /// when neither side set `stale-if-error` or when stale serving is forbidden.
    pub stale_if_error: Option<u64>,
    stale_forbidden: bool,
}

impl Freshness {
    /// How far past its lifetime the entry is, in seconds
    pub fn staleness(&self) -> u64 {
        self.age.saturating_sub(self.lifetime)
    }

    /// Decide again once a [Verdict::MissForward] has been forwarded.
    ///
    /// A failed forward or a 5xx is replaced with the stale entry while within the
    /// `stale-if-error` window. A status that matches one of `use_stale` is replaced at any
    /// staleness. A 304 is never replaced. Any other verdict is returned unchanged.
    pub fn after_forward(&self, outcome: ForwardOutcome, use_stale: &[StatusPattern]) -> Verdict {
        if self.verdict != Verdict::MissForward(MissReason::Stale) || self.stale_forbidden {
            return self.verdict;
        }
        let (status, failed) = match outcome {
            ForwardOutcome::Status(304) => return self.verdict,
            ForwardOutcome::Status(status) => (status, false),
            ForwardOutcome::Failed(status) => (status, true),
        };
        let error = failed || (500..600).contains(&status);
        if error {
            if let Some(window) = self.stale_if_error {
                if self.staleness() <= window {
                    debug!(
                        "stale-if-error: serving stale by {}s within {window}s",
                        self.staleness()
                    );
                    return Verdict::StaleIfErrorHit;
                }
            }
        }
        if use_stale.iter().any(|p| p.matches(status)) {
            debug!("cache_use_stale: serving stale instead of {status}");
            return Verdict::StaleIfErrorHit;
        }
        self.verdict
    }
}

fn ignore_invalid<T>(name: &str, value: Result<Option<T>>) -> Option<T> {
    value.unwrap_or_else(|e| {
        debug!("ignoring invalid {name}: {e}");
        None
    })
}

/// Decide how the entry may be used for the request at `now`.
///
/// Fails with [ErrorType::MalformedCacheControl] when the stored response repeats
/// `stale-if-error`.
pub fn evaluate(input: &FreshnessInput, now: Instant) -> Result<Freshness> {
    let req_cc = input.request_directives.filtered(input.ignored);
    let resp_cc = input.entry.response_directives.filtered(input.ignored);
    resp_cc.check_response()?;

    let age = input.entry.age(now);
    let lifetime = u64::from(resp_cc.fresh_sec().unwrap_or(0));
    let stale_forbidden = resp_cc.forbids_stale();
    let stale_if_error = if stale_forbidden {
        None
    } else {
        // the request side keeps its first value when repeated
        let resp = ignore_invalid("stale-if-error", resp_cc.stale_if_error());
        let req = ignore_invalid("stale-if-error", req_cc.stale_if_error());
        resp.max(req).map(u64::from)
    };

    let mut freshness = Freshness {
        age,
        lifetime,
        verdict: Verdict::FreshHit,
        stale_if_error,
        stale_forbidden,
    };
    freshness.verdict = decide(input, &req_cc, &resp_cc, &freshness);
    trace!(
        "{}: age {age}, lifetime {lifetime}, {:?}",
        input.entry.key,
        freshness.verdict
    );
    Ok(freshness)
}

fn decide(
    input: &FreshnessInput,
    req_cc: &CacheControl,
    resp_cc: &CacheControl,
    freshness: &Freshness,
) -> Verdict {
    let only_if_cached = req_cc.only_if_cached();
    let forward = |reason| {
        if only_if_cached {
            Verdict::OnlyIfCachedUnsatisfiable
        } else {
            Verdict::MissForward(reason)
        }
    };
    let (age, lifetime) = (freshness.age, freshness.lifetime);

    if req_cc.no_store() {
        return forward(MissReason::RequestNoStore);
    }
    if req_cc.no_cache() {
        return forward(MissReason::RequestNoCache);
    }
    if resp_cc.no_store() || resp_cc.private() || resp_cc.no_cache() {
        return forward(MissReason::NotReusable);
    }
    if input.authorization && !resp_cc.allow_caching_authorized_req() {
        return forward(MissReason::Authorization);
    }
    if let Some(max_age) = ignore_invalid("max-age", req_cc.max_age()) {
        if age > u64::from(max_age) {
            return forward(MissReason::TooOld);
        }
    }
    let fresh_enough = match ignore_invalid("min-fresh", req_cc.min_fresh()) {
        Some(min_fresh) => lifetime.saturating_sub(age) >= u64::from(min_fresh),
        None => true,
    };
    if age < lifetime && fresh_enough {
        return Verdict::FreshHit;
    }

    // stale, at least for this request
    if freshness.stale_forbidden {
        return forward(MissReason::RevalidationRequired);
    }
    match req_cc.max_stale() {
        Ok(Some(None)) => return Verdict::StaleHit,
        Ok(Some(Some(max_stale))) if freshness.staleness() <= u64::from(max_stale) => {
            return Verdict::StaleHit
        }
        Ok(_) => {}
        Err(e) => debug!("ignoring invalid max-stale: {e}"),
    }
    if only_if_cached {
        return Verdict::OnlyIfCachedUnsatisfiable;
    }
    Verdict::MissForward(MissReason::Stale)
}

/// The response to replay from `entry`: `Age` is set, and stale responses get a `Warning`.
pub fn cached_response(entry: &CacheEntry, age: u64, stale: bool) -> Response {
    let mut resp = entry.response.clone();
    resp.headers.set(header::AGE, age.to_string());
    if stale {
        resp.headers.add(header::WARNING, STALE_WARNING);
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use std::time::{Duration, SystemTime};

    struct Timeline {
        start: Instant,
    }

    impl Timeline {
        fn new() -> Self {
            Timeline {
                start: Instant::now(),
            }
        }

        fn at(&self, secs: u64) -> Instant {
            self.start + Duration::from_secs(secs)
        }

        fn entry(&self, resp_cc: &str) -> CacheEntry {
            let mut resp = Response::build(200).unwrap();
            if !resp_cc.is_empty() {
                resp.headers.add("Cache-Control", resp_cc.to_string());
            }
            resp.set_body("cached");
            CacheEntry::new(
                CacheKey::new("GET", "localhost", "/"),
                resp,
                CacheControl::default(),
                SystemTime::now(),
                self.start,
            )
        }
    }

    fn eval_with(
        entry: &CacheEntry,
        req_cc: &str,
        authorization: bool,
        ignored: &[String],
        now: Instant,
    ) -> Result<Freshness> {
        let req_cc = CacheControl::parse(req_cc);
        evaluate(
            &FreshnessInput {
                request_directives: &req_cc,
                authorization,
                entry,
                ignored,
            },
            now,
        )
    }

    fn eval(entry: &CacheEntry, req_cc: &str, now: Instant) -> Freshness {
        eval_with(entry, req_cc, false, &[], now).unwrap()
    }

    #[test]
    fn test_fresh_boundary() {
        let t = Timeline::new();
        let entry = t.entry("max-age=2");
        let f = eval(&entry, "", t.at(1));
        assert_eq!(f.verdict, Verdict::FreshHit);
        assert_eq!(f.age, 1);
        assert_eq!(f.lifetime, 2);
        // repeated evaluation is stable
        assert_eq!(eval(&entry, "", t.at(1)), f);

        let f = eval(&entry, "", t.at(2));
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));
        assert_eq!(f.age, 2);
    }

    #[test]
    fn test_no_lifetime_is_stale() {
        let t = Timeline::new();
        let f = eval(&t.entry(""), "", t.at(0));
        assert_eq!(f.lifetime, 0);
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));
        // a broken max-age gives no lifetime either
        let f = eval(&t.entry("max-age=soon"), "", t.at(0));
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));
    }

    #[test]
    fn test_s_maxage_overrides_max_age() {
        let t = Timeline::new();
        let entry = t.entry("max-age=5, s-maxage=1");
        let f = eval(&entry, "", t.at(2));
        assert_eq!(f.lifetime, 1);
        // s-maxage also forbids serving stale
        assert_eq!(
            f.verdict,
            Verdict::MissForward(MissReason::RevalidationRequired)
        );
        let f = eval(&entry, "max-stale", t.at(2));
        assert_eq!(
            f.verdict,
            Verdict::MissForward(MissReason::RevalidationRequired)
        );
    }

    #[test]
    fn test_max_stale() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1");
        let f = eval(&entry, "max-stale", t.at(2));
        assert_eq!(f.verdict, Verdict::StaleHit);
        assert_eq!(f.age, 2);
        assert_eq!(f.staleness(), 1);

        assert_eq!(eval(&entry, "max-stale=1", t.at(2)).verdict, Verdict::StaleHit);
        assert_eq!(
            eval(&entry, "max-stale=1", t.at(3)).verdict,
            Verdict::MissForward(MissReason::Stale)
        );
        // a fresh response is fresh regardless
        assert_eq!(eval(&entry, "max-stale", t.at(0)).verdict, Verdict::FreshHit);
    }

    #[test]
    fn test_revalidate_forbids_max_stale() {
        let t = Timeline::new();
        for cc in ["max-age=1, must-revalidate", "max-age=1, proxy-revalidate"] {
            let f = eval(&t.entry(cc), "max-stale", t.at(2));
            assert_eq!(
                f.verdict,
                Verdict::MissForward(MissReason::RevalidationRequired),
                "{cc}"
            );
            assert_eq!(f.stale_if_error, None);
        }
    }

    #[test]
    fn test_request_max_age_and_min_fresh() {
        let t = Timeline::new();
        let entry = t.entry("max-age=10");
        assert_eq!(eval(&entry, "max-age=3", t.at(3)).verdict, Verdict::FreshHit);
        assert_eq!(
            eval(&entry, "max-age=3", t.at(4)).verdict,
            Verdict::MissForward(MissReason::TooOld)
        );

        assert_eq!(eval(&entry, "min-fresh=5", t.at(5)).verdict, Verdict::FreshHit);
        // fresh, but not for long enough
        assert_eq!(
            eval(&entry, "min-fresh=5", t.at(6)).verdict,
            Verdict::MissForward(MissReason::Stale)
        );
        assert_eq!(
            eval(&entry, "min-fresh=5, max-stale", t.at(6)).verdict,
            Verdict::StaleHit
        );
    }

    #[test]
    fn test_delta_seconds_overflow() {
        let t = Timeline::new();
        let cap = u64::from(crate::cache_control::DELTA_SECONDS_OVERFLOW_VALUE);
        let mut resp = Response::build(200).unwrap();
        resp.headers.add("Cache-Control", "max-age=99999999999");
        resp.headers.add("Age", "99999999999999999999");
        resp.set_body("cached");
        let entry = CacheEntry::new(
            CacheKey::new("GET", "localhost", "/"),
            resp,
            CacheControl::default(),
            SystemTime::now(),
            t.start,
        );

        // both sides saturate to the same value
        let f = eval(&entry, "", t.at(0));
        assert_eq!((f.age, f.lifetime), (cap, cap));
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));
        let f = eval(&entry, "max-stale=99999999999", t.at(5));
        assert_eq!(f.age, cap + 5);
        assert_eq!(f.staleness(), 5);
        assert_eq!(f.verdict, Verdict::StaleHit);
        assert_eq!(
            eval(&entry, "max-age=2147483648", t.at(1)).verdict,
            Verdict::MissForward(MissReason::TooOld)
        );

        let entry = t.entry("max-age=10");
        for min_fresh in ["min-fresh=2147483648", "min-fresh=99999999999"] {
            assert_eq!(
                eval(&entry, min_fresh, t.at(0)).verdict,
                Verdict::MissForward(MissReason::Stale),
                "{min_fresh}"
            );
        }
        assert_eq!(
            eval(&entry, "max-stale=2147483648", t.at(100)).verdict,
            Verdict::StaleHit
        );
    }

    #[test]
    fn test_not_reusable() {
        let t = Timeline::new();
        let entry = t.entry("max-age=10");
        assert_eq!(
            eval(&entry, "no-store", t.at(0)).verdict,
            Verdict::MissForward(MissReason::RequestNoStore)
        );
        assert_eq!(
            eval(&entry, "no-cache", t.at(0)).verdict,
            Verdict::MissForward(MissReason::RequestNoCache)
        );
        for cc in ["max-age=10, no-store", "max-age=10, private", "max-age=10, no-cache"] {
            assert_eq!(
                eval(&t.entry(cc), "", t.at(0)).verdict,
                Verdict::MissForward(MissReason::NotReusable),
                "{cc}"
            );
        }
        // field-name forms only restrict the listed fields
        assert_eq!(
            eval(&t.entry("max-age=10, private=\"x-a\""), "", t.at(0)).verdict,
            Verdict::FreshHit
        );
    }

    #[test]
    fn test_authorization() {
        let t = Timeline::new();
        let f = eval_with(&t.entry("max-age=5"), "", true, &[], t.at(0)).unwrap();
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Authorization));
        for cc in ["max-age=5, public", "max-age=5, must-revalidate", "s-maxage=5"] {
            let f = eval_with(&t.entry(cc), "", true, &[], t.at(0)).unwrap();
            assert_eq!(f.verdict, Verdict::FreshHit, "{cc}");
        }
    }

    #[test]
    fn test_only_if_cached() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1");
        assert_eq!(
            eval(&entry, "only-if-cached", t.at(0)).verdict,
            Verdict::FreshHit
        );
        assert_eq!(
            eval(&entry, "only-if-cached, max-stale", t.at(5)).verdict,
            Verdict::StaleHit
        );
        assert_eq!(
            eval(&entry, "only-if-cached", t.at(5)).verdict,
            Verdict::OnlyIfCachedUnsatisfiable
        );
        // every reason to forward becomes unsatisfiable
        assert_eq!(
            eval(&entry, "only-if-cached, no-cache", t.at(0)).verdict,
            Verdict::OnlyIfCachedUnsatisfiable
        );
        assert_eq!(
            eval(&t.entry("max-age=1, must-revalidate"), "only-if-cached", t.at(5)).verdict,
            Verdict::OnlyIfCachedUnsatisfiable
        );
    }

    #[test]
    fn test_stale_if_error_window() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1, stale-if-error=20");
        let f = eval(&entry, "", t.at(3));
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));
        assert_eq!(f.stale_if_error, Some(20));
        for status in [500, 502, 503, 504] {
            assert_eq!(
                f.after_forward(ForwardOutcome::Status(status), &[]),
                Verdict::StaleIfErrorHit
            );
        }
        assert_eq!(
            f.after_forward(ForwardOutcome::Failed(502), &[]),
            Verdict::StaleIfErrorHit
        );
        // a usable response wins
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(200), &[]),
            Verdict::MissForward(MissReason::Stale)
        );
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(404), &[]),
            Verdict::MissForward(MissReason::Stale)
        );

        // 1 + 20 seconds is the last moment
        let f = eval(&entry, "", t.at(21));
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(500), &[]),
            Verdict::StaleIfErrorHit
        );
        let f = eval(&entry, "", t.at(24));
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(500), &[]),
            Verdict::MissForward(MissReason::Stale)
        );
    }

    #[test]
    fn test_stale_if_error_from_request() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1");
        let f = eval(&entry, "stale-if-error=20", t.at(3));
        assert_eq!(f.stale_if_error, Some(20));
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(503), &[]),
            Verdict::StaleIfErrorHit
        );
        // the larger window wins
        let entry = t.entry("max-age=1, stale-if-error=5");
        assert_eq!(eval(&entry, "stale-if-error=20", t.at(3)).stale_if_error, Some(20));
        // the first of repeated request values is used
        let f = eval(&t.entry("max-age=1"), "stale-if-error=20, stale-if-error=1", t.at(3));
        assert_eq!(f.stale_if_error, Some(20));
    }

    #[test]
    fn test_stale_if_error_forbidden() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1, must-revalidate, stale-if-error=20");
        let f = eval(&entry, "stale-if-error=20", t.at(3));
        assert_eq!(f.stale_if_error, None);
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(500), &[StatusPattern::Class(5)]),
            Verdict::MissForward(MissReason::RevalidationRequired)
        );
    }

    #[test]
    fn test_not_modified_never_served_stale() {
        let t = Timeline::new();
        let f = eval(&t.entry("max-age=1, stale-if-error=10"), "", t.at(3));
        let use_stale = ["3*".parse::<StatusPattern>().unwrap()];
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(304), &use_stale),
            Verdict::MissForward(MissReason::Stale)
        );
    }

    #[test]
    fn test_use_stale_patterns() {
        let t = Timeline::new();
        // far beyond any window
        let f = eval(&t.entry("max-age=1"), "", t.at(1000));
        let patterns = |p: &[&str]| -> Vec<StatusPattern> {
            p.iter().map(|s| s.parse().unwrap()).collect()
        };
        let cases = [
            (500, vec!["500"], true),
            (400, vec!["400"], true),
            (502, vec!["5*"], true),
            (403, vec!["4*"], true),
            (404, vec!["4*", "5*"], true),
            (200, vec!["4*", "5*"], false),
            (501, vec!["500"], false),
        ];
        for (status, use_stale, stale) in cases {
            let verdict = f.after_forward(ForwardOutcome::Status(status), &patterns(&use_stale));
            assert_eq!(verdict == Verdict::StaleIfErrorHit, stale, "{status} {use_stale:?}");
        }
        // failures use the status they are answered with
        assert_eq!(
            f.after_forward(ForwardOutcome::Failed(504), &patterns(&["504"])),
            Verdict::StaleIfErrorHit
        );
        assert_eq!(
            f.after_forward(ForwardOutcome::Failed(502), &patterns(&["504"])),
            Verdict::MissForward(MissReason::Stale)
        );
    }

    #[test]
    fn test_use_stale_only_for_stale_entries() {
        let t = Timeline::new();
        let f = eval_with(&t.entry("max-age=1"), "", true, &[], t.at(5)).unwrap();
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(500), &[StatusPattern::Class(5)]),
            Verdict::MissForward(MissReason::Authorization)
        );
        let f = eval(&t.entry("max-age=10"), "", t.at(1));
        assert_eq!(
            f.after_forward(ForwardOutcome::Status(500), &[StatusPattern::Class(5)]),
            Verdict::FreshHit
        );
    }

    #[test]
    fn test_status_pattern() {
        assert_eq!("500".parse::<StatusPattern>().unwrap(), StatusPattern::Exact(500));
        assert_eq!("4*".parse::<StatusPattern>().unwrap(), StatusPattern::Class(4));
        for bad in ["", "5", "5**", "600", "6*", "*", "50x", "0*"] {
            let e = bad.parse::<StatusPattern>().unwrap_err();
            assert_eq!(e.etype(), &ErrorType::InvalidConfig, "{bad}");
        }
        assert!(StatusPattern::Class(5).matches(599));
        assert!(!StatusPattern::Class(5).matches(600));
    }

    #[test]
    fn test_duplicated_stale_if_error_response() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1, stale-if-error=20, stale-if-error=19");
        let e = eval_with(&entry, "", false, &[], t.at(0)).unwrap_err();
        assert_eq!(e.etype(), &ErrorType::MalformedCacheControl);
        assert_eq!(e.status_code(), 502);
        // unless the directive is ignored
        let ignored = vec!["stale-if-error".to_string()];
        let f = eval_with(&entry, "", false, &ignored, t.at(0)).unwrap();
        assert_eq!(f.verdict, Verdict::FreshHit);
        assert_eq!(f.stale_if_error, None);
    }

    #[test]
    fn test_ignored_directives() {
        let t = Timeline::new();
        let entry = t.entry("max-age=1, s-maxage=5");
        let ignored = vec!["s-maxage".to_string()];
        let f = eval_with(&entry, "", false, &ignored, t.at(2)).unwrap();
        assert_eq!(f.lifetime, 1);
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));

        let ignored = vec!["max-age".to_string()];
        let f = eval_with(&t.entry("max-age=10"), "max-age=0", false, &ignored, t.at(1)).unwrap();
        // both sides lose max-age: no lifetime and no request limit
        assert_eq!(f.lifetime, 0);
        assert_eq!(f.verdict, Verdict::MissForward(MissReason::Stale));

        let ignored = vec!["no-cache".to_string()];
        let f = eval_with(&t.entry("max-age=10"), "no-cache", false, &ignored, t.at(1)).unwrap();
        assert_eq!(f.verdict, Verdict::FreshHit);
    }

    #[test]
    fn test_cached_response_headers() {
        let t = Timeline::new();
        let mut entry = t.entry("max-age=1");
        entry.response.headers.add("Age", "100");
        let fresh = cached_response(&entry, 1, false);
        assert_eq!(fresh.headers.find_all("age").collect::<Vec<_>>(), ["1"]);
        assert!(!fresh.headers.contains("warning"));
        assert_eq!(fresh.body, "cached");

        let stale = cached_response(&entry, 2, true);
        assert_eq!(stale.headers.get("age"), Some("2"));
        assert_eq!(stale.headers.get("warning"), Some(STALE_WARNING));
        deproxy_http::expect::validate_warning(&stale.headers).unwrap();
    }
}
