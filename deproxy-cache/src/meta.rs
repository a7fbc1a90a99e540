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

//! Cached responses and their metadata

use deproxy_http::{date, header, Response};
use log::{debug, warn};
use std::num::IntErrorKind;
use std::time::{Duration, Instant, SystemTime};

use crate::cache_control::{CacheControl, DELTA_SECONDS_OVERFLOW_VALUE};
use crate::key::CacheKey;

/// A stored response with everything needed to decide whether it can be reused.
///
/// Entries are never modified once stored. A newer response for the same key replaces the
/// whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// The response as it will be replayed, already stripped of the fields that must not be
    /// stored
    pub response: Response,
    pub response_directives: CacheControl,
    /// Directives of the request that filled the entry
    pub request_directives: CacheControl,
    /// The `Date` of the response, or `response_time` if it had none
    pub date: SystemTime,
    /// When the response was received
    pub response_time: SystemTime,
    /// When the entry was stored, on the monotonic clock
    pub stored_at: Instant,
}

impl CacheEntry {
    /// Create an entry for `response`, received at `response_time` and stored at `stored_at`.
    pub fn new(
        key: CacheKey,
        response: Response,
        request_directives: CacheControl,
        response_time: SystemTime,
        stored_at: Instant,
    ) -> Self {
        let response_directives = CacheControl::from_headers_or_default(&response.headers);
        let date = match date::header_as_http_date(&response.headers, header::DATE) {
            Ok(Some(date)) => date,
            Ok(None) => response_time,
            Err(e) => {
                warn!("invalid Date in response to {key}: {e}");
                response_time
            }
        };
        CacheEntry {
            key,
            response,
            response_directives,
            request_directives,
            date,
            response_time,
            stored_at,
        }
    }

    /// The `Age` the response carried when it was received, 0 when absent or invalid.
    ///
    /// Like any delta-seconds the value is capped to [DELTA_SECONDS_OVERFLOW_VALUE].
    pub fn age_value(&self) -> Duration {
        let Some(value) = self.response.headers.get(header::AGE) else {
            return Duration::ZERO;
        };
        let secs = match value.trim().parse::<u32>() {
            Ok(secs) => secs.min(DELTA_SECONDS_OVERFLOW_VALUE),
            Err(e) if e.kind() == &IntErrorKind::PosOverflow => DELTA_SECONDS_OVERFLOW_VALUE,
            Err(e) => {
                debug!("ignoring invalid Age {value:?} of {}: {e}", self.key);
                0
            }
        };
        Duration::from_secs(u64::from(secs))
    }

    /// How old the response already was on arrival, from its `Date`.
    pub fn apparent_age(&self) -> Duration {
        self.response_time
            .duration_since(self.date)
            .unwrap_or(Duration::ZERO)
    }

    /// How long the entry has been in the cache at `now`
    pub fn resident_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    /// The current age of the response in whole seconds
    /// ([RFC 9111 §4.2.3](https://datatracker.ietf.org/doc/html/rfc9111#section-4.2.3)).
    pub fn age(&self, now: Instant) -> u64 {
        let corrected_initial_age = self.apparent_age().max(self.age_value());
        corrected_initial_age
            .saturating_add(self.resident_time(now))
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deproxy_http::date::fmt_http_date;

    fn response(fields: &[(&'static str, &str)]) -> Response {
        let mut resp = Response::build(200).unwrap();
        for (name, value) in fields {
            resp.headers.add(*name, value.to_string());
        }
        resp
    }

    fn entry(resp: Response, response_time: SystemTime, stored_at: Instant) -> CacheEntry {
        CacheEntry::new(
            CacheKey::new("GET", "localhost", "/"),
            resp,
            CacheControl::default(),
            response_time,
            stored_at,
        )
    }

    #[test]
    fn test_directives_and_date() {
        let received = SystemTime::now();
        let date = received - Duration::from_secs(10);
        let e = entry(
            response(&[
                ("Cache-Control", "max-age=5"),
                ("Date", fmt_http_date(date).as_str()),
            ]),
            received,
            Instant::now(),
        );
        assert_eq!(e.response_directives.max_age().unwrap(), Some(5));
        assert_eq!(e.apparent_age().as_secs(), 10);

        // a missing or broken Date counts as the time of receipt
        let e = entry(response(&[]), received, Instant::now());
        assert_eq!(e.date, received);
        let e = entry(response(&[("Date", "garbage")]), received, Instant::now());
        assert_eq!(e.date, received);
        assert_eq!(e.apparent_age(), Duration::ZERO);
    }

    #[test]
    fn test_age() {
        let stored_at = Instant::now();
        let received = SystemTime::now();
        let e = entry(response(&[]), received, stored_at);
        assert_eq!(e.age(stored_at), 0);
        assert_eq!(e.age(stored_at + Duration::from_millis(1999)), 1);
        assert_eq!(e.age(stored_at + Duration::from_secs(2)), 2);
        // the clock never goes backwards
        assert_eq!(e.resident_time(stored_at - Duration::from_secs(1)), Duration::ZERO);

        // the larger of Age and the apparent age counts
        let date = fmt_http_date(received - Duration::from_secs(3));
        let e = entry(
            response(&[("Age", "7"), ("Date", date.as_str())]),
            received,
            stored_at,
        );
        assert_eq!(e.age_value().as_secs(), 7);
        assert_eq!(e.age(stored_at + Duration::from_secs(1)), 8);
        let e = entry(
            response(&[("Age", "1"), ("Date", date.as_str())]),
            received,
            stored_at,
        );
        assert_eq!(e.age(stored_at + Duration::from_secs(1)), 4);
    }

    #[test]
    fn test_huge_age() {
        let stored_at = Instant::now();
        let received = SystemTime::now();
        let cap = u64::from(DELTA_SECONDS_OVERFLOW_VALUE);
        for age in ["18446744073709551615", "99999999999999999999999", "2147483649"] {
            let e = entry(
                response(&[("Cache-Control", "max-age=5"), ("Age", age)]),
                received,
                stored_at,
            );
            assert_eq!(e.age_value().as_secs(), cap);
            assert_eq!(e.age(stored_at + Duration::from_secs(1)), cap + 1);
        }

        let e = entry(response(&[("Age", "-1")]), received, stored_at);
        assert_eq!(e.age_value(), Duration::ZERO);

        // a Date far in the past
        let e = entry(
            response(&[("Age", "4294967295"), ("Date", "Thu, 01 Jan 1970 00:00:00 GMT")]),
            received,
            stored_at,
        );
        assert_eq!(e.age(stored_at + Duration::from_secs(1)), cap + 1);
    }
}
