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

//! Functions and utilities to help parse Cache-Control headers

use deproxy_error::{Error, ErrorType, Result};
use deproxy_http::HeaderMultimap;
use http::header::CACHE_CONTROL;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::num::IntErrorKind;
use std::slice;
use std::str;

/// The max delta-second per [RFC 9111](https://datatracker.ietf.org/doc/html/rfc9111#section-1.2.2)
// "If a cache receives a delta-seconds
// value greater than the greatest integer it can represent, or if any
// of its subsequent calculations overflows, the cache MUST consider the
// value to be either 2147483648 (2^31) or the greatest positive integer
// it can conveniently represent."
pub const DELTA_SECONDS_OVERFLOW_VALUE: u32 = 2147483648;

/// Cache control directive key type
pub type DirectiveKey = String;

/// Cache control directive value type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveValue(pub Vec<u8>);

impl AsRef<[u8]> for DirectiveValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl DirectiveValue {
    /// A [DirectiveValue] without quotes (`"`).
    pub fn parse_as_bytes(&self) -> &[u8] {
        self.0
            .strip_prefix(&[b'"'])
            .and_then(|bytes| bytes.strip_suffix(&[b'"']))
            .unwrap_or(&self.0[..])
    }

    /// A [DirectiveValue] without quotes (`"`) as `str`.
    pub fn parse_as_str(&self) -> Result<&str> {
        str::from_utf8(self.parse_as_bytes()).or_else(|e| {
            Error::e_because(
                ErrorType::InvalidHTTPHeader,
                "could not parse value as utf8",
                e,
            )
        })
    }

    /// Parse the [DirectiveValue] as delta seconds
    ///
    /// `"`s are ignored. The value is capped to [DELTA_SECONDS_OVERFLOW_VALUE].
    pub fn parse_as_delta_seconds(&self) -> Result<u32> {
        match self.parse_as_str()?.parse::<u32>() {
            Ok(value) => Ok(value.min(DELTA_SECONDS_OVERFLOW_VALUE)),
            Err(e) => {
                // delta-seconds expect to handle positive overflow gracefully
                if e.kind() == &IntErrorKind::PosOverflow {
                    Ok(DELTA_SECONDS_OVERFLOW_VALUE)
                } else {
                    Error::e_because(
                        ErrorType::InvalidHTTPHeader,
                        "could not parse value as u32",
                        e,
                    )
                }
            }
        }
    }
}

/// An ordered map to store cache control key value pairs.
pub type DirectiveMap = IndexMap<DirectiveKey, Option<DirectiveValue>>;

/// Parsed Cache-Control directives
///
/// When a directive appears more than once only its first occurrence is kept in
/// [Self::directives]. Whether it was repeated is still known, see [Self::is_duplicated()].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// The parsed directives
    pub directives: DirectiveMap,
    duplicated: Vec<DirectiveKey>,
}

/// Cacheability calculated from cache control.
#[derive(Debug, PartialEq, Eq)]
pub enum Cacheable {
    /// Cacheable
    Yes,
    /// Not cacheable
    No,
    /// No directive found for explicit cacheability
    Default,
}

/// An iter over all the cache control directives
pub struct ListValueIter<'a>(slice::Split<'a, u8, fn(&u8) -> bool>);

impl<'a> ListValueIter<'a> {
    pub fn from(value: &'a DirectiveValue) -> Self {
        ListValueIter(value.parse_as_bytes().split(|byte| byte == &b','))
    }
}

// https://datatracker.ietf.org/doc/html/rfc9110#name-whitespace
// optional whitespace OWS = *(SP / HTAB); SP = 0x20, HTAB = 0x09
fn trim_ows(bytes: &[u8]) -> &[u8] {
    fn not_ows(b: &u8) -> bool {
        b != &b'\x20' && b != &b'\x09'
    }
    // find first non-OWS char from front (head) and from end (tail)
    let head = bytes.iter().position(not_ows).unwrap_or(0);
    let tail = bytes
        .iter()
        .rposition(not_ows)
        .map(|rpos| rpos + 1)
        .unwrap_or(head);
    &bytes[head..tail]
}

impl<'a> Iterator for ListValueIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        Some(trim_ows(self.0.next()?))
    }
}

// Cache-Control   = 1#cache-directive
// cache-directive = token [ "=" ( token / quoted-string ) ]
// token           = [^\x00-\x20\(\)<>@\,;\:\\"\/\[\]\?\=\{\}\x7F]+
// quoted-string   = "(?:[^"\\]|\\.)*"
//
// `(?-u)` puts the regex in ASCII compatible mode so that \x7F means the byte.
// `(?:^|(?:\s*[,;]\s*))` accepts both , and ; as delimiters.
// The first group is the directive name, the optional second one its token or quoted-string.
static RE_CACHE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?-u)(?:^|(?:\s*[,;]\s*))([^\x00-\x20\(\)<>@,;:\\"/\[\]\?=\{\}\x7F]+)(?:=((?:[^\x00-\x20\(\)<>@,;:\\"/\[\]\?=\{\}\x7F]+|(?:"(?:[^"\\]|\\.)*"))))?"#)
        .expect("static cache directive regex")
});

impl CacheControl {
    // The parser is more permissive than the RFC in a few ways:
    // - Allows semicolons as delimiters (in addition to commas).
    // - Doesn't require no-value for "boolean directives," such as must-revalidate
    // - Allows quoted-string format for numeric values.
    /// Parse the directives of all the given `Cache-Control` values, in order.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cc = CacheControl::default();
        for line in values {
            for captures in RE_CACHE_DIRECTIVE.captures_iter(line.as_bytes()) {
                let Some(key) = captures.get(1).and_then(|cap| {
                    str::from_utf8(cap.as_bytes())
                        .ok()
                        .map(|token| token.to_lowercase())
                }) else {
                    continue;
                };
                let value = captures
                    .get(2)
                    .map(|cap| DirectiveValue(cap.as_bytes().to_vec()));
                if cc.directives.contains_key(&key) {
                    if !cc.duplicated.contains(&key) {
                        cc.duplicated.push(key);
                    }
                } else {
                    cc.directives.insert(key, value);
                }
            }
        }
        cc
    }

    /// Parse a single `Cache-Control` value
    pub fn parse(value: &str) -> Self {
        Self::from_values([value])
    }

    /// Parse every `Cache-Control` field of `headers`. `None` if there is none.
    pub fn from_headers(headers: &HeaderMultimap) -> Option<Self> {
        let mut values = headers.find_all(CACHE_CONTROL).peekable();
        values.peek()?;
        Some(Self::from_values(values))
    }

    /// Like [Self::from_headers()] but an absent header yields no directives.
    pub fn from_headers_or_default(headers: &HeaderMultimap) -> Self {
        Self::from_values(headers.find_all(CACHE_CONTROL))
    }

    /// A copy without the `ignored` directive names, as if they were never sent.
    pub fn filtered<S: AsRef<str>>(&self, ignored: &[S]) -> Self {
        if ignored.is_empty() {
            return self.clone();
        }
        let is_ignored =
            |key: &str| ignored.iter().any(|i| i.as_ref().eq_ignore_ascii_case(key));
        CacheControl {
            directives: self
                .directives
                .iter()
                .filter(|(k, _)| !is_ignored(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            duplicated: self
                .duplicated
                .iter()
                .filter(|k| !is_ignored(k))
                .cloned()
                .collect(),
        }
    }

    /// Whether the given directive is in the cache control.
    pub fn has_key(&self, key: &str) -> bool {
        self.directives.contains_key(key)
    }

    /// Whether the given directive appears more than once.
    pub fn is_duplicated(&self, key: &str) -> bool {
        self.duplicated.iter().any(|k| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Whether the `public` directive is in the cache control.
    pub fn public(&self) -> bool {
        self.has_key("public")
    }

    /// Whether the given directive exists, and it has no value.
    fn has_key_without_value(&self, key: &str) -> bool {
        matches!(self.directives.get(key), Some(None))
    }

    /// Whether the standalone `private` exists in the cache control
    // RFC 9111: using the #field-name versions of `private`
    // means a shared cache "MUST NOT store the specified field-name(s),
    // whereas it MAY store the remainder of the response."
    // It must be a boolean form (no value) to apply to the whole response.
    pub fn private(&self) -> bool {
        self.has_key_without_value("private")
    }

    fn get_field_names(&self, key: &str) -> Option<ListValueIter> {
        if let Some(Some(value)) = self.directives.get(key) {
            Some(ListValueIter::from(value))
        } else {
            None
        }
    }

    /// Get the values of `private=`
    pub fn private_field_names(&self) -> Option<ListValueIter> {
        self.get_field_names("private")
    }

    /// Whether the standalone `no-cache` exists in the cache control
    pub fn no_cache(&self) -> bool {
        self.has_key_without_value("no-cache")
    }

    /// Get the values of `no-cache=`
    pub fn no_cache_field_names(&self) -> Option<ListValueIter> {
        self.get_field_names("no-cache")
    }

    /// Whether `no-store` exists.
    pub fn no_store(&self) -> bool {
        self.has_key("no-store")
    }

    fn parse_delta_seconds(&self, key: &str) -> Result<Option<u32>> {
        if let Some(Some(dir_value)) = self.directives.get(key) {
            Ok(Some(dir_value.parse_as_delta_seconds()?))
        } else {
            Ok(None)
        }
    }

    /// Return the `max-age` seconds
    pub fn max_age(&self) -> Result<Option<u32>> {
        self.parse_delta_seconds("max-age")
    }

    /// Return the `s-maxage` seconds
    pub fn s_maxage(&self) -> Result<Option<u32>> {
        self.parse_delta_seconds("s-maxage")
    }

    /// Return the `min-fresh` seconds
    pub fn min_fresh(&self) -> Result<Option<u32>> {
        self.parse_delta_seconds("min-fresh")
    }

    /// Return the `max-stale` seconds.
    ///
    /// `Some(None)` is a `max-stale` without argument: any staleness is accepted.
    pub fn max_stale(&self) -> Result<Option<Option<u32>>> {
        match self.directives.get("max-stale") {
            None => Ok(None),
            Some(None) => Ok(Some(None)),
            Some(Some(v)) => Ok(Some(Some(v.parse_as_delta_seconds()?))),
        }
    }

    /// Return the first `stale-if-error` seconds
    pub fn stale_if_error(&self) -> Result<Option<u32>> {
        self.parse_delta_seconds("stale-if-error")
    }

    /// Reject directive sets a response must not carry. Currently a repeated `stale-if-error`,
    /// since its window is ambiguous.
    pub fn check_response(&self) -> Result<()> {
        if self.is_duplicated("stale-if-error") {
            return Error::e_explain(
                ErrorType::MalformedCacheControl,
                "duplicated stale-if-error in response",
            );
        }
        Ok(())
    }

    /// Whether `must-revalidate` exists.
    pub fn must_revalidate(&self) -> bool {
        self.has_key("must-revalidate")
    }

    /// Whether `proxy-revalidate` exists.
    pub fn proxy_revalidate(&self) -> bool {
        self.has_key("proxy-revalidate")
    }

    /// Whether `only-if-cached` exists.
    pub fn only_if_cached(&self) -> bool {
        self.has_key("only-if-cached")
    }
}

impl InterpretCacheControl for CacheControl {
    fn is_cacheable(&self) -> Cacheable {
        if self.no_store() || self.private() || self.no_cache() {
            return Cacheable::No;
        }
        if self.has_key("s-maxage") || self.has_key("max-age") || self.public() {
            return Cacheable::Yes;
        }
        Cacheable::Default
    }

    fn allow_caching_authorized_req(&self) -> bool {
        // RFC 9111 https://datatracker.ietf.org/doc/html/rfc9111#section-3.5
        // "MUST NOT" reuse responses to requests with Authorization header
        // unless response contains one of these directives
        self.must_revalidate() || self.public() || self.has_key("s-maxage")
    }

    fn fresh_sec(&self) -> Option<u32> {
        match self.s_maxage() {
            Ok(Some(seconds)) => Some(seconds),
            // s-maxage not present
            Ok(None) => match self.max_age() {
                Ok(Some(seconds)) => Some(seconds),
                _ => None,
            },
            _ => None,
        }
    }

    fn forbids_stale(&self) -> bool {
        // A shared cache honors proxy-revalidate as well, and s-maxage implies it.
        // https://datatracker.ietf.org/doc/html/rfc9111#section-5.2.2.10
        self.must_revalidate() || self.proxy_revalidate() || self.has_key("s-maxage")
    }

    // Strip header names listed in `private` or `no-cache` directives from a response.
    fn strip_private_headers(&self, headers: &mut HeaderMultimap) {
        fn strip_listed_headers(headers: &mut HeaderMultimap, field_names: ListValueIter) {
            for name in field_names {
                if let Ok(name) = str::from_utf8(name) {
                    if !name.is_empty() {
                        headers.delete_all(name);
                    }
                }
            }
        }

        if let Some(names) = self.private_field_names() {
            strip_listed_headers(headers, names);
        }
        // `no-cache` with field names is treated the same way as `private`,
        // though technically it only requires revalidation before reuse.
        if let Some(names) = self.no_cache_field_names() {
            strip_listed_headers(headers, names);
        }
    }
}

/// `InterpretCacheControl` provides a meaningful interface to the parsed `CacheControl`.
/// These functions actually interpret the parsed cache-control directives to return
/// the freshness or other cache meta values that cache-control is signaling.
///
/// `CacheControl` implements an RFC 9111 compliant reading for a shared (proxy) cache.
pub trait InterpretCacheControl {
    /// Does cache-control specify this response is cacheable?
    ///
    /// Note that an RFC 9111 compliant cacheability check must also
    /// check if the request contained the Authorization header and
    /// `allow_caching_authorized_req`.
    fn is_cacheable(&self) -> Cacheable;

    /// Does this cache-control allow caching a response to
    /// a request with the Authorization header?
    fn allow_caching_authorized_req(&self) -> bool;

    /// Returns freshness ttl specified in cache-control
    ///
    /// - `Some(_)` indicates cache-control specifies a valid ttl. Some(0) = always stale.
    /// - `None` means cache-control did not specify a valid ttl.
    fn fresh_sec(&self) -> Option<u32>;

    /// Whether a stale response must not be served without revalidation, no matter what
    /// `max-stale` or `stale-if-error` allow.
    fn forbids_stale(&self) -> bool;

    /// Strip header names listed in `private` or `no-cache` directives from a response,
    /// usually prior to storing that response in cache.
    fn strip_private_headers(&self, headers: &mut HeaderMultimap);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_headers(cc_value: &str) -> HeaderMultimap {
        let mut headers = HeaderMultimap::new();
        headers.add("Cache-Control", cc_value.to_string());
        headers
    }

    fn parse(cc_value: &str) -> CacheControl {
        CacheControl::from_headers(&build_headers(cc_value)).unwrap()
    }

    #[test]
    fn test_simple_cache_control() {
        let cc = parse("public, max-age=10000");
        assert!(cc.public());
        assert_eq!(cc.max_age().unwrap().unwrap(), 10000);
    }

    #[test]
    fn test_private_cache_control() {
        let cc = parse("private");
        assert!(cc.private());
        assert!(cc.max_age().unwrap().is_none());
    }

    #[test]
    fn test_absent_header() {
        let headers = HeaderMultimap::new();
        assert!(CacheControl::from_headers(&headers).is_none());
        assert!(CacheControl::from_headers_or_default(&headers).is_empty());
    }

    #[test]
    fn test_directives_across_header_lines() {
        let mut headers = HeaderMultimap::new();
        headers.add("Cache-Control", "public,");
        headers.add("cache-Control", "max-age=10000");
        let cc = CacheControl::from_headers(&headers).unwrap();

        assert!(cc.public());
        assert_eq!(cc.max_age().unwrap().unwrap(), 10000);
    }

    #[test]
    fn test_recognizes_semicolons_as_delimiters() {
        let cc = parse("public; max-age=0");
        assert!(cc.public());
        assert_eq!(cc.max_age().unwrap().unwrap(), 0);
    }

    #[test]
    fn test_unknown_directives() {
        let cc = parse("public,random1=random2, rand3=\"\"");
        let mut directive_iter = cc.directives.iter();

        let first = directive_iter.next().unwrap();
        assert_eq!(first.0, &"public");
        assert!(first.1.is_none());

        let second = directive_iter.next().unwrap();
        assert_eq!(second.0, &"random1");
        assert_eq!(second.1.as_ref().unwrap().0, "random2".as_bytes());

        let third = directive_iter.next().unwrap();
        assert_eq!(third.0, &"rand3");
        assert_eq!(third.1.as_ref().unwrap().0, "\"\"".as_bytes());

        assert!(directive_iter.next().is_none());
    }

    #[test]
    fn test_case_insensitive_directive_keys() {
        let cc = parse("Public=\"something\", mAx-AGe=\"10000\", foo=cRaZyCaSe, bAr=\"inQuotes\"");

        assert!(cc.public());
        assert_eq!(cc.max_age().unwrap().unwrap(), 10000);

        let mut directive_iter = cc.directives.iter();
        let first = directive_iter.next().unwrap();
        assert_eq!(first.0, &"public");
        assert_eq!(first.1.as_ref().unwrap().0, "\"something\"".as_bytes());

        let second = directive_iter.next().unwrap();
        assert_eq!(second.0, &"max-age");
        assert_eq!(second.1.as_ref().unwrap().0, "\"10000\"".as_bytes());

        // values are still stored with casing
        let third = directive_iter.next().unwrap();
        assert_eq!(third.0, &"foo");
        assert_eq!(third.1.as_ref().unwrap().0, "cRaZyCaSe".as_bytes());

        let fourth = directive_iter.next().unwrap();
        assert_eq!(fourth.0, &"bar");
        assert_eq!(fourth.1.as_ref().unwrap().0, "\"inQuotes\"".as_bytes());

        assert!(directive_iter.next().is_none());
    }

    #[test]
    fn test_non_ascii() {
        let cc = parse("püblic=💖, max-age=\"💯\"");

        // Not considered valid registered directive keys / values
        assert!(!cc.public());
        let e = cc.max_age().unwrap_err();
        assert_eq!(e.etype(), &ErrorType::InvalidHTTPHeader);
        assert_eq!(e.context.unwrap().to_string(), "could not parse value as u32");

        let mut directive_iter = cc.directives.iter();
        let first = directive_iter.next().unwrap();
        assert_eq!(first.0, &"püblic");
        assert_eq!(first.1.as_ref().unwrap().0, "💖".as_bytes());
    }

    #[test]
    fn test_age_overflow() {
        let cc = parse("max-age=-99999999999999999999999999, s-maxage=99999999999999999999999999");

        assert_eq!(
            cc.s_maxage().unwrap().unwrap(),
            DELTA_SECONDS_OVERFLOW_VALUE
        );
        // negative ages still result in errors even with overflow handling
        assert_eq!(
            cc.max_age().unwrap_err().context.unwrap().to_string(),
            "could not parse value as u32"
        );
        // representable but beyond 2^31
        let cc = parse("max-age=4000000000");
        assert_eq!(cc.max_age().unwrap().unwrap(), DELTA_SECONDS_OVERFLOW_VALUE);
    }

    #[test]
    fn test_duplicated_first_wins() {
        let cc = parse("stale-if-error=20, max-age=1, stale-if-error=19");
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 20);
        assert!(cc.is_duplicated("stale-if-error"));
        assert!(!cc.is_duplicated("max-age"));
        assert_eq!(
            cc.check_response().unwrap_err().etype(),
            &ErrorType::MalformedCacheControl
        );
        // first position is kept as well
        let keys: Vec<_> = cc.directives.keys().collect();
        assert_eq!(keys, ["stale-if-error", "max-age"]);

        let mut headers = HeaderMultimap::new();
        headers.add("Cache-Control", "stale-if-error=5");
        headers.add("Cache-Control", "stale-if-error=7");
        let cc = CacheControl::from_headers(&headers).unwrap();
        assert!(cc.is_duplicated("stale-if-error"));
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 5);

        parse("stale-if-error=20").check_response().unwrap();
    }

    #[test]
    fn test_filtered() {
        let cc = parse("max-age=5, s-maxage=1, stale-if-error=1, stale-if-error=2");
        let ignored = cc.filtered(&["S-MAXAGE", "stale-if-error"]);
        assert!(!ignored.has_key("s-maxage"));
        assert!(!ignored.has_key("stale-if-error"));
        assert!(!ignored.is_duplicated("stale-if-error"));
        assert_eq!(ignored.fresh_sec(), Some(5));
        ignored.check_response().unwrap();

        let none: [&str; 0] = [];
        assert_eq!(cc.filtered(&none), cc);
    }

    #[test]
    fn test_request_directives() {
        let cc = parse("max-stale, min-fresh=3, only-if-cached");
        assert_eq!(cc.max_stale().unwrap(), Some(None));
        assert_eq!(cc.min_fresh().unwrap(), Some(3));
        assert!(cc.only_if_cached());

        let cc = parse("max-stale=10");
        assert_eq!(cc.max_stale().unwrap(), Some(Some(10)));
        assert_eq!(cc.min_fresh().unwrap(), None);
        assert!(!cc.only_if_cached());

        let cc = parse("max-stale=never");
        assert!(cc.max_stale().is_err());
    }

    #[test]
    fn test_fresh_sec() {
        let cc = parse("");
        assert!(cc.fresh_sec().is_none());

        let cc = parse("max-age=12345");
        assert_eq!(cc.fresh_sec().unwrap(), 12345);

        let cc = parse("max-age=99999,s-maxage=123");
        // prefer s-maxage over max-age
        assert_eq!(cc.fresh_sec().unwrap(), 123);
    }

    #[test]
    fn test_cacheability() {
        let cc = parse("");
        assert_eq!(cc.is_cacheable(), Cacheable::Default);

        // uncacheable
        let cc = parse("private, max-age=12345");
        assert_eq!(cc.is_cacheable(), Cacheable::No);

        let cc = parse("no-store, max-age=12345");
        assert_eq!(cc.is_cacheable(), Cacheable::No);

        let cc = parse("no-cache, max-age=12345");
        assert_eq!(cc.is_cacheable(), Cacheable::No);

        // cacheable
        let cc = parse("public");
        assert_eq!(cc.is_cacheable(), Cacheable::Yes);

        let cc = parse("max-age=0");
        assert_eq!(cc.is_cacheable(), Cacheable::Yes);
    }

    #[test]
    fn test_no_cache_field_names() {
        let cc = parse("no-cache=\"set-cookie\", max-age=12345");
        assert!(!cc.private());
        assert!(!cc.no_cache());
        assert_eq!(cc.is_cacheable(), Cacheable::Yes);
        assert_eq!(cc.fresh_sec().unwrap(), 12345);
        let mut field_names = cc.no_cache_field_names().unwrap();
        assert_eq!(
            str::from_utf8(field_names.next().unwrap()).unwrap(),
            "set-cookie"
        );
        assert!(field_names.next().is_none());

        let cc = parse("private=\"\", no-cache=\"set-cookie, Baz\x09 , c,d  ,, \"");
        let mut field_names = cc.private_field_names().unwrap();
        assert_eq!(str::from_utf8(field_names.next().unwrap()).unwrap(), "");
        assert!(field_names.next().is_none());
        let names: Vec<_> = cc
            .no_cache_field_names()
            .unwrap()
            .map(|n| str::from_utf8(n).unwrap())
            .collect();
        assert_eq!(names, ["set-cookie", "Baz", "c", "d", "", ""]);
    }

    #[test]
    fn test_strip_private_headers() {
        let mut headers = build_headers("no-cache=\"x-private-header\", private=\"X-Other\"");
        headers.add("X-Private-Header", "dropped");
        headers.add("x-other", "dropped");
        headers.add("X-Kept", "kept");

        let cc = CacheControl::from_headers(&headers).unwrap();
        cc.strip_private_headers(&mut headers);
        assert!(!headers.contains("X-Private-Header"));
        assert!(!headers.contains("X-Other"));
        assert_eq!(headers.get("x-kept"), Some("kept"));
    }

    #[test]
    fn test_stale_if_error() {
        let cc = parse("max-age=12345, stale-if-error=3600");
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 3600);
        assert!(!cc.forbids_stale());
    }

    #[test]
    fn test_must_revalidate() {
        let cc = parse("max-age=12345, stale-if-error=30, must-revalidate");
        assert!(cc.must_revalidate());
        assert!(cc.forbids_stale());
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 30);
    }

    #[test]
    fn test_proxy_revalidate() {
        let cc = parse("max-age=12345, stale-if-error=30, proxy-revalidate");
        assert!(cc.proxy_revalidate());
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 30);
        assert!(cc.forbids_stale());
    }

    #[test]
    fn test_s_maxage_stale() {
        let cc = parse("s-maxage=0, stale-if-error=30");
        assert_eq!(cc.stale_if_error().unwrap().unwrap(), 30);
        assert!(cc.forbids_stale());
    }

    #[test]
    fn test_authorized_request() {
        assert!(!parse("max-age=10").allow_caching_authorized_req());
        assert!(parse("s-maxage=10").allow_caching_authorized_req());
        assert!(parse("public").allow_caching_authorized_req());
        assert!(parse("must-revalidate, max-age=0").allow_caching_authorized_req());
        assert!(!parse("").allow_caching_authorized_req());
    }

    #[test]
    fn test_request_only_if_cached() {
        let cc = CacheControl::parse("only-if-cached=1");
        assert!(cc.only_if_cached())
    }
}
