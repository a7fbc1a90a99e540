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

//! Ordered multimap of header fields

use bytes::BufMut;
use std::slice;

use crate::case_header_name::{CaseHeaderName, IntoCaseHeaderName};

pub const CRLF: &[u8; 2] = b"\r\n";
pub const HEADER_KV_DELIMITER: &[u8; 2] = b": ";

/// An ordered list of header fields.
///
/// Lookups are case-insensitive. Duplicated names are kept as separate entries in the order they
/// were added, and the original case of every name is preserved for serialization.
///
/// Header lists are small, so every lookup is a linear scan.
#[derive(Debug, Clone, Default)]
pub struct HeaderMultimap {
    fields: Vec<(CaseHeaderName, String)>,
}

impl HeaderMultimap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HeaderMultimap {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a header field. Existing fields under the same name are left untouched.
    pub fn add(&mut self, name: impl IntoCaseHeaderName, value: impl Into<String>) {
        self.fields
            .push((name.into_case_header_name(), value.into()));
    }

    /// The value of the first field named `name`.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.fields
            .iter()
            .find(|(n, _)| n.matches(name))
            .map(|(_, v)| v.as_str())
    }

    /// All the values under `name`, in the order they were added.
    ///
    /// The returned iterator is lazy and can be cloned to restart the scan.
    pub fn find_all<N: AsRef<str>>(&self, name: N) -> FindAll<'_, N> {
        FindAll {
            name,
            iter: self.fields.iter(),
        }
    }

    /// Overwrite the value of the first field named `name` and remove any later duplicates.
    /// Append the field if there is none.
    pub fn set(&mut self, name: impl IntoCaseHeaderName, value: impl Into<String>) {
        let name = name.into_case_header_name();
        let value = value.into();
        match self.fields.iter().position(|(n, _)| n.matches(name.as_str())) {
            Some(first) => {
                self.fields[first].1 = value;
                let mut idx = 0;
                self.fields.retain(|(n, _)| {
                    let keep = idx <= first || !n.matches(name.as_str());
                    idx += 1;
                    keep
                });
            }
            None => self.fields.push((name, value)),
        }
    }

    /// Remove every field named `name`. Return how many were removed.
    pub fn delete_all(&mut self, name: impl AsRef<str>) -> usize {
        let name = name.as_ref();
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !n.matches(name));
        before - self.fields.len()
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.get(name).is_some()
    }

    /// How many fields are named `name`
    pub fn count(&self, name: impl AsRef<str>) -> usize {
        self.find_all(name).count()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(name, value)` in order, with names in their original case.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub(crate) fn fields(&self) -> &[(CaseHeaderName, String)] {
        &self.fields
    }

    /// Whether the last token of the last `Transfer-Encoding` field is `chunked`.
    pub fn is_chunked(&self) -> bool {
        last_transfer_coding(self).map_or(false, |t| t.eq_ignore_ascii_case("chunked"))
    }

    /// Write the fields to `buf` in HTTP/1.1 wire format. The header case is preserved.
    pub fn write_h1_wire(&self, buf: &mut impl BufMut) {
        for (name, value) in self.fields.iter() {
            write_field(name, value, buf);
        }
    }

    /// Lower-cased `(name, value)` pairs, sorted, for order-insensitive comparison.
    pub(crate) fn normalized(&self) -> Vec<(String, &str)> {
        let mut pairs: Vec<_> = self
            .fields
            .iter()
            .map(|(n, v)| (n.to_lowercase(), v.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

#[inline]
pub(crate) fn write_field(name: &CaseHeaderName, value: &str, buf: &mut impl BufMut) {
    buf.put_slice(name.as_str().as_bytes());
    buf.put_slice(HEADER_KV_DELIMITER);
    buf.put_slice(value.as_bytes());
    buf.put_slice(CRLF);
}

/// The final transfer-coding applied to the message, if any.
pub(crate) fn last_transfer_coding(headers: &HeaderMultimap) -> Option<&str> {
    headers
        .find_all(http::header::TRANSFER_ENCODING)
        .last()
        .and_then(|v| v.split(',').map(str::trim).filter(|t| !t.is_empty()).last())
}

/// Two maps are equal when they hold the same fields regardless of order and name case.
impl PartialEq for HeaderMultimap {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len() && self.normalized() == other.normalized()
    }
}

impl Eq for HeaderMultimap {}

impl<N: IntoCaseHeaderName, V: Into<String>> FromIterator<(N, V)> for HeaderMultimap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = HeaderMultimap::new();
        for (n, v) in iter {
            map.add(n, v);
        }
        map
    }
}

/// Iterator over the values of one header name. See [HeaderMultimap::find_all()].
#[derive(Clone)]
pub struct FindAll<'a, N> {
    name: N,
    iter: slice::Iter<'a, (CaseHeaderName, String)>,
}

impl<'a, N: AsRef<str>> Iterator for FindAll<'a, N> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.name.as_ref();
        self.iter
            .by_ref()
            .find(|(n, _)| n.matches(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn sample() -> HeaderMultimap {
        let mut h = HeaderMultimap::new();
        h.add("Cache-Control", "max-age=1");
        h.add("X-Foo", "a");
        h.add("cache-control", "stale-if-error=5");
        h.add("CACHE-CONTROL", "public");
        h
    }

    #[test]
    fn test_add_keeps_duplicates() {
        let h = sample();
        assert_eq!(h.len(), 4);
        assert_eq!(h.count("cache-control"), 3);
        assert_eq!(h.get("Cache-control"), Some("max-age=1"));
        assert_eq!(h.get("x-bar"), None);
    }

    #[test]
    fn test_find_all_in_order_and_restartable() {
        let h = sample();
        let values = h.find_all(header::CACHE_CONTROL);
        let first: Vec<_> = values.clone().collect();
        let again: Vec<_> = values.collect();
        assert_eq!(first, vec!["max-age=1", "stale-if-error=5", "public"]);
        assert_eq!(first, again);
        assert_eq!(h.find_all("missing").count(), 0);
    }

    #[test]
    fn test_set_overwrites_first_and_drops_rest() {
        let mut h = sample();
        h.set("Cache-Control", "no-store");
        assert_eq!(h.count("cache-control"), 1);
        assert_eq!(h.get("cache-control"), Some("no-store"));
        // the surviving field keeps its position and name case
        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Cache-Control", "X-Foo"]);

        h.set(header::AGE, "3");
        assert_eq!(h.get("age"), Some("3"));
        assert_eq!(h.iter().last(), Some(("Age", "3")));
    }

    #[test]
    fn test_delete_all() {
        let mut h = sample();
        assert_eq!(h.delete_all("CACHE-control"), 3);
        assert_eq!(h.len(), 1);
        assert!(!h.contains("cache-control"));
        assert_eq!(h.delete_all("cache-control"), 0);
    }

    #[test]
    fn test_equality_ignores_order_and_case() {
        let mut a = HeaderMultimap::new();
        a.add("Host", "example.com");
        a.add("X-A", "1");
        a.add("x-a", "2");

        let b: HeaderMultimap = vec![("x-a", "2"), ("host", "example.com"), ("X-A", "1")]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        let c: HeaderMultimap = vec![("x-a", "2"), ("host", "example.com")]
            .into_iter()
            .collect();
        assert_ne!(a, c);

        // values stay case sensitive
        let d: HeaderMultimap = vec![("x-a", "2"), ("host", "Example.com"), ("X-A", "1")]
            .into_iter()
            .collect();
        assert_ne!(a, d);
    }

    #[test]
    fn test_h1_wire() {
        let mut h = HeaderMultimap::new();
        h.add("FoO", "Bar");
        h.add("fOO", "bar");
        h.add(header::CONTENT_LENGTH, "0");
        let mut buf: Vec<u8> = vec![];
        h.write_h1_wire(&mut buf);
        assert_eq!(buf, b"FoO: Bar\r\nfOO: bar\r\nContent-Length: 0\r\n");
    }

    #[test]
    fn test_chunked() {
        let mut h = HeaderMultimap::new();
        assert!(!h.is_chunked());
        h.add("Transfer-Encoding", "gzip, Chunked");
        assert!(h.is_chunked());
        h.add("Transfer-Encoding", "gzip");
        assert!(!h.is_chunked());
    }
}
