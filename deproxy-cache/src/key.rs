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

//! Cache key

use blake2::{Blake2b, Digest};
use deproxy_http::Request;
use std::fmt::{Display, Formatter, Result as FmtResult};

// 16-byte / 128-bit key: large enough to avoid collision
const KEY_SIZE: usize = 16;

/// An 128 bit hash binary
pub type HashBinary = [u8; KEY_SIZE];

fn hex2str(hex: &[u8]) -> String {
    hex::encode(hex)
}

/// Decode the hex str into [HashBinary].
///
/// Return `None` when the decode fails or the input is not exact 32 (to decode to 16 bytes).
pub fn str2hex(s: &str) -> Option<HashBinary> {
    if s.len() != KEY_SIZE * 2 {
        return None;
    }
    let mut output = [0; KEY_SIZE];
    // no need to bubble the error, it should be obvious why the decode fails
    hex::decode_to_slice(s.as_bytes(), &mut output).ok()?;
    Some(output)
}

/// The trait for cache key
pub trait CacheHashKey {
    /// Return the hash of the cache key
    fn primary_bin(&self) -> HashBinary;

    /// The hex string of [Self::primary_bin()]
    fn primary(&self) -> String {
        hex2str(&self.primary_bin())
    }

    /// The hash as an integer, for sharding and in-memory tables
    fn primary_u128(&self) -> u128 {
        // endianness doesn't matter
        u128::from_be_bytes(self.primary_bin())
    }
}

/// The identity of a cached response: the request method, the target host and the request
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: String,
    authority: String,
    uri: String,
}

impl CacheKey {
    pub fn new(
        method: impl Into<String>,
        authority: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        CacheKey {
            method: method.into(),
            authority: authority.into(),
            uri: uri.into(),
        }
    }

    /// The key of the response to `req`. The authority comes from `Host` and is case-folded.
    pub fn from_request(req: &Request) -> Self {
        CacheKey::new(
            req.method.as_str(),
            req.authority().unwrap_or_default().to_ascii_lowercase(),
            req.uri.as_str(),
        )
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/*
 * blake2 is used for its consistent output across machines, unlike hashes designed
 * purely for in memory hashtables such as ahash.
 */

// hash output: we use 128 bits (16 bytes) hash which will map to 32 bytes hex string
pub(crate) type Blake2b128 = Blake2b<blake2::digest::consts::U16>;

/// helper function: hash key (String or Bytes) to [HashBinary]
pub fn hash_key<K: AsRef<[u8]>>(key: K) -> HashBinary {
    let mut hasher = Blake2b128::new();
    hasher.update(key.as_ref());
    hasher.finalize().into()
}

impl CacheHashKey for CacheKey {
    fn primary_bin(&self) -> HashBinary {
        let mut hasher = Blake2b128::new();
        // each part is length prefixed so that no two keys share an input
        for part in [&self.method, &self.authority, &self.uri] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().into()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{} {}{} ({})",
            self.method,
            self.authority,
            self.uri,
            self.primary()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_hash() {
        let key = CacheKey::new("GET", "example.com", "/a");
        let hash = key.primary();
        assert_eq!(hash.len(), KEY_SIZE * 2);
        assert_eq!(hash, CacheKey::new("GET", "example.com", "/a").primary());
        assert_eq!(str2hex(&hash), Some(key.primary_bin()));

        // every part contributes
        assert_ne!(hash, CacheKey::new("HEAD", "example.com", "/a").primary());
        assert_ne!(hash, CacheKey::new("GET", "example.org", "/a").primary());
        assert_ne!(hash, CacheKey::new("GET", "example.com", "/b").primary());
        // shifting bytes between parts makes a different key
        assert_ne!(
            CacheKey::new("GET", "ab", "/c").primary(),
            CacheKey::new("GET", "a", "b/c").primary()
        );
    }

    #[test]
    fn test_from_request() {
        let mut req = Request::build("GET", "/index.html?q=1").unwrap();
        req.headers.add("Host", "Example.COM");
        let key = CacheKey::from_request(&req);
        assert_eq!(key, CacheKey::new("GET", "example.com", "/index.html?q=1"));
        assert!(key.to_string().starts_with("GET example.com/index.html?q=1 ("));

        let req = Request::build("GET", "/").unwrap();
        assert_eq!(CacheKey::from_request(&req).authority(), "");
    }

    #[test]
    fn test_hash_key() {
        assert_eq!(
            hex2str(&hash_key("aa")),
            "ac10f2aef117729f8dad056b3059eb7e"
        );
    }

    #[test]
    fn test_hex_str() {
        let mut key = [0; KEY_SIZE];
        for (i, v) in key.iter_mut().enumerate() {
            // key: [0, 1, 2, .., 15]
            *v = i as u8;
        }
        let hex_str = hex2str(&key);
        assert_eq!(hex_str, "000102030405060708090a0b0c0d0e0f");
        assert_eq!(str2hex(&hex_str).unwrap(), key);
        assert!(str2hex("00").is_none());
        assert!(str2hex("zz0102030405060708090a0b0c0d0e0f").is_none());
    }
}
