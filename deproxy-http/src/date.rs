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

//! HTTP-date helpers

use deproxy_error::{ErrorType::InvalidHTTPHeader, OrErr, Result};
use std::time::SystemTime;

use crate::header_map::HeaderMultimap;

/// Format `time` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn fmt_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parse any of the three HTTP-date formats.
pub fn parse_http_date(value: &str) -> Result<SystemTime> {
    httpdate::parse_http_date(value.trim())
        .or_err_with(InvalidHTTPHeader, || format!("invalid HTTP date {value:?}"))
}

/// Parse the first `name` field of `headers` as an HTTP-date. `Ok(None)` if there is none.
pub fn header_as_http_date(
    headers: &HeaderMultimap,
    name: impl AsRef<str>,
) -> Result<Option<SystemTime>> {
    headers.get(name).map(parse_http_date).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_date_string() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        assert_eq!(fmt_http_date(t), "Thu, 01 Jan 1970 00:00:01 GMT");
        assert_eq!(parse_http_date("Thu, 01 Jan 1970 00:00:01 GMT").unwrap(), t);
        // asctime is still accepted
        assert_eq!(parse_http_date("Thu Jan  1 00:00:01 1970").unwrap(), t);
        assert!(parse_http_date("yesterday").is_err());
    }

    #[test]
    fn test_header_date() {
        let mut h = HeaderMultimap::new();
        assert_eq!(header_as_http_date(&h, "date").unwrap(), None);
        h.add("Date", "Fri, 26 Mar 2010 00:05:00 GMT");
        assert!(header_as_http_date(&h, "date").unwrap().is_some());
        h.set("Date", "0");
        assert!(header_as_http_date(&h, "date").is_err());
    }
}
