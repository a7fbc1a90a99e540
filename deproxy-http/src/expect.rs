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

//! Compare a message against the one it is expected to be
//!
//! A cache legitimately rewrites a few fields of the messages it passes on: it sets `Age`,
//! may add a `Warning`, refreshes `Date` and manages `Connection`. Those fields are checked
//! against the rules below instead of being compared verbatim. Every other field must match.

use deproxy_error::{Error, ErrorType::MessageMismatch, Result};
use http::header;
use log::debug;
use std::time::{Duration, SystemTime};

use crate::date::parse_http_date;
use crate::header_map::HeaderMultimap;
use crate::message::{HttpMessage, Message};

/// The warn-codes a cache may attach to a response.
pub const WARNINGS: &[&str] = &[
    STALE_WARNING,
    "111 - Revalidation Failed",
    "112 - Disconnected Operation",
    "113 - Heuristic Expiration",
    "199 - Miscellaneous Warning",
    "214 - Transformation Applied",
    "299 - Miscellaneous Persistent Warning",
];

/// Added to a response served stale
pub const STALE_WARNING: &str = "110 - Response is stale";

/// How far `Date` may drift from the expected value by default
pub const DATE_TOLERANCE: Duration = Duration::from_secs(5);

const VOLATILE: &[&str] = &["date", "age", "connection", "warning"];

fn mismatch<T>(context: String) -> Result<T> {
    debug!("message mismatch: {context}");
    Error::e_explain(MessageMismatch, context)
}

/// Check that there is at most one `Age` holding a non-negative integer. Return its value.
pub fn validate_age(headers: &HeaderMultimap) -> Result<Option<u64>> {
    let mut ages = headers.find_all(header::AGE);
    let Some(age) = ages.next() else {
        return Ok(None);
    };
    if ages.next().is_some() {
        return mismatch(format!("{} Age fields", headers.count(header::AGE)));
    }
    match age.trim().parse::<u64>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => mismatch(format!("Age is not a non-negative integer: {age:?}")),
    }
}

/// Check that every `Warning` value is one a cache may generate.
pub fn validate_warning(headers: &HeaderMultimap) -> Result<()> {
    match headers
        .find_all(header::WARNING)
        .find(|w| !WARNINGS.contains(&w.trim()))
    {
        Some(w) => mismatch(format!("unknown Warning {w:?}")),
        None => Ok(()),
    }
}

/// Check that there is at most one `Connection`, either `close` or `keep-alive`.
pub fn validate_connection(headers: &HeaderMultimap) -> Result<()> {
    let count = headers.count(header::CONNECTION);
    if count > 1 {
        return mismatch(format!("{count} Connection fields"));
    }
    match headers.get(header::CONNECTION) {
        Some(v)
            if !v.trim().eq_ignore_ascii_case("close")
                && !v.trim().eq_ignore_ascii_case("keep-alive") =>
        {
            mismatch(format!("invalid Connection {v:?}"))
        }
        _ => Ok(()),
    }
}

fn single_date(headers: &HeaderMultimap) -> Option<&str> {
    let mut dates = headers.find_all(header::DATE);
    match (dates.next(), dates.next()) {
        (Some(d), None) => Some(d),
        _ => None,
    }
}

fn verify_date(
    actual: &HeaderMultimap,
    expected: &HeaderMultimap,
    tolerance: Duration,
) -> Result<()> {
    let (Some(a), Some(e)) = (single_date(actual), single_date(expected)) else {
        return Ok(());
    };
    let (a_time, e_time) = match (parse_http_date(a), parse_http_date(e)) {
        (Ok(a), Ok(e)) => (a, e),
        _ => return mismatch(format!("unparsable Date, actual {a:?}, expected {e:?}")),
    };
    let drift = a_time
        .duration_since(e_time)
        .or_else(|_| e_time.duration_since(a_time))
        .unwrap_or(Duration::ZERO);
    if drift > tolerance {
        return mismatch(format!("Date {a:?} is {}s away from {e:?}", drift.as_secs()));
    }
    Ok(())
}

fn verify_age(actual: &HeaderMultimap, expected: &HeaderMultimap) -> Result<()> {
    let actual_age = validate_age(actual)?;
    let mut expected_ages = expected.find_all(header::AGE);
    let (Some(e), None) = (expected_ages.next(), expected_ages.next()) else {
        return Ok(());
    };
    let Ok(e) = e.trim().parse::<u64>() else {
        return Ok(());
    };
    match actual_age {
        Some(a) if a >= e => Ok(()),
        Some(a) => mismatch(format!("Age {a} is less than the expected {e}")),
        None => mismatch(format!("missing Age, expected {e}")),
    }
}

fn values<'a>(headers: &'a HeaderMultimap, name: &str) -> Vec<&'a str> {
    headers.find_all(name).collect()
}

fn verify_connection(actual: &HeaderMultimap, expected: &HeaderMultimap) -> Result<()> {
    let a = values(actual, "connection");
    let e = values(expected, "connection");
    if !a.is_empty() && !e.is_empty() {
        if a != e {
            return mismatch(format!("Connection {a:?}, expected {e:?}"));
        }
        return Ok(());
    }
    validate_connection(actual)
}

fn verify_warning(actual: &HeaderMultimap, expected: &HeaderMultimap) -> Result<()> {
    let a = values(actual, "warning");
    let e = values(expected, "warning");
    match (a.is_empty(), e.is_empty()) {
        (false, false) if a != e => mismatch(format!("Warning {a:?}, expected {e:?}")),
        (true, false) => mismatch(format!("missing Warning, expected {e:?}")),
        _ => validate_warning(actual),
    }
}

fn without_volatile(headers: &HeaderMultimap) -> HeaderMultimap {
    headers
        .iter()
        .filter(|(n, _)| !VOLATILE.iter().any(|v| v.eq_ignore_ascii_case(n)))
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

/// Compare two header sections.
///
/// `Date`, `Age`, `Connection` and `Warning` follow their own rules, see [validate_age()],
/// [validate_warning()] and [validate_connection()]. `Date` is compared when both sides have
/// exactly one, and may drift by `tolerance`. The remaining fields must be the same multiset.
pub fn verify_headers(
    actual: &HeaderMultimap,
    expected: &HeaderMultimap,
    tolerance: Duration,
) -> Result<()> {
    verify_date(actual, expected, tolerance)?;
    verify_age(actual, expected)?;
    verify_connection(actual, expected)?;
    verify_warning(actual, expected)?;

    let a = without_volatile(actual);
    let e = without_volatile(expected);
    if a == e {
        return Ok(());
    }
    let a = a.normalized();
    let e = e.normalized();
    if let Some((name, value)) = a.iter().find(|f| !e.contains(f)) {
        return mismatch(format!("unexpected field {name}: {value}"));
    }
    match e.iter().find(|f| !a.contains(f)) {
        Some((name, value)) => mismatch(format!("missing field {name}: {value}")),
        // same fields, different multiplicity
        None => mismatch(format!("{} fields, expected {}", a.len(), e.len())),
    }
}

/// Compare two messages: variant, start line, headers, body and trailer.
pub fn verify_message(actual: &Message, expected: &Message, tolerance: Duration) -> Result<()> {
    match (actual, expected) {
        (Message::Request(a), Message::Request(e)) => {
            if a.method != e.method || a.uri != e.uri {
                return mismatch(format!(
                    "request line {} {}, expected {} {}",
                    a.method, a.uri, e.method, e.uri
                ));
            }
        }
        (Message::Response(a), Message::Response(e)) => {
            if a.status != e.status || a.reason != e.reason {
                return mismatch(format!(
                    "status {} {}, expected {} {}",
                    a.status, a.reason, e.status, e.reason
                ));
            }
        }
        (Message::H2Request(_), Message::H2Request(_))
        | (Message::H2Response(_), Message::H2Response(_)) => {}
        _ => return mismatch("message kinds differ".to_string()),
    }

    let (a, e) = (actual.parts(), expected.parts());
    if a.version != e.version {
        return mismatch(format!("version {}, expected {}", a.version, e.version));
    }
    verify_headers(&a.headers, &e.headers, tolerance)?;
    if a.body != e.body {
        return mismatch(format!(
            "body of {} bytes differs from the expected {} bytes",
            a.body.len(),
            e.body.len()
        ));
    }
    verify_headers(&a.trailer, &e.trailer, tolerance)
}

/// [verify_message()] for two HTTP/1.x or two HTTP/2 messages of the same kind.
pub fn verify<M: HttpMessage + Clone + Into<Message>>(actual: &M, expected: &M) -> Result<()> {
    verify_message(
        &actual.clone().into(),
        &expected.clone().into(),
        DATE_TOLERANCE,
    )
}

/// The `Date` of `headers` is within `tolerance` of `now`.
pub fn date_is_recent(headers: &HeaderMultimap, now: SystemTime, tolerance: Duration) -> bool {
    single_date(headers)
        .and_then(|d| parse_http_date(d).ok())
        .map_or(false, |d| {
            let drift = now
                .duration_since(d)
                .or_else(|_| d.duration_since(now))
                .unwrap_or(Duration::ZERO);
            drift <= tolerance
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::fmt_http_date;
    use crate::message::{Request, Response};

    fn headers(fields: &[(&'static str, &str)]) -> HeaderMultimap {
        fields.iter().map(|(n, v)| (*n, v.to_string())).collect()
    }

    fn assert_mismatch(r: Result<()>) {
        assert_eq!(r.unwrap_err().etype(), &MessageMismatch);
    }

    #[test]
    fn test_validate_age() {
        assert_eq!(validate_age(&headers(&[])).unwrap(), None);
        assert_eq!(validate_age(&headers(&[("Age", "12")])).unwrap(), Some(12));
        assert_mismatch(validate_age(&headers(&[("Age", "-1")])).map(|_| ()));
        assert_mismatch(validate_age(&headers(&[("Age", "soon")])).map(|_| ()));
        assert_mismatch(validate_age(&headers(&[("Age", "1"), ("age", "2")])).map(|_| ()));
    }

    #[test]
    fn test_validate_warning_and_connection() {
        validate_warning(&headers(&[("Warning", STALE_WARNING)])).unwrap();
        validate_warning(&headers(&[("Warning", "113 - Heuristic Expiration")])).unwrap();
        assert_mismatch(validate_warning(&headers(&[("Warning", "110 - stale")])));

        validate_connection(&headers(&[])).unwrap();
        validate_connection(&headers(&[("Connection", "keep-alive")])).unwrap();
        validate_connection(&headers(&[("Connection", "Close")])).unwrap();
        assert_mismatch(validate_connection(&headers(&[("Connection", "upgrade")])));
        assert_mismatch(validate_connection(&headers(&[
            ("Connection", "close"),
            ("Connection", "close"),
        ])));
    }

    #[test]
    fn test_date_tolerance() {
        let now = SystemTime::now();
        let expected = headers(&[("Date", fmt_http_date(now).as_str())]);
        let close_by = fmt_http_date(now + Duration::from_secs(3));
        let far_off = fmt_http_date(now - Duration::from_secs(30));
        let close = headers(&[("Date", close_by.as_str())]);
        let far = headers(&[("Date", far_off.as_str())]);
        verify_headers(&close, &expected, DATE_TOLERANCE).unwrap();
        assert_mismatch(verify_headers(&far, &expected, DATE_TOLERANCE));
        // a Date the expectation does not mention is not compared
        verify_headers(&far, &headers(&[]), DATE_TOLERANCE).unwrap();
        assert!(date_is_recent(&close, now, DATE_TOLERANCE));
        assert!(!date_is_recent(&far, now, DATE_TOLERANCE));
    }

    #[test]
    fn test_age_rules() {
        let expected = headers(&[("Age", "3")]);
        verify_headers(&headers(&[("Age", "3")]), &expected, DATE_TOLERANCE).unwrap();
        verify_headers(&headers(&[("Age", "5")]), &expected, DATE_TOLERANCE).unwrap();
        assert_mismatch(verify_headers(&headers(&[("Age", "2")]), &expected, DATE_TOLERANCE));
        assert_mismatch(verify_headers(&headers(&[]), &expected, DATE_TOLERANCE));
        // a cache may add Age on its own
        verify_headers(&headers(&[("Age", "0")]), &headers(&[]), DATE_TOLERANCE).unwrap();
    }

    #[test]
    fn test_warning_presence() {
        let stale = headers(&[("Warning", STALE_WARNING)]);
        verify_headers(&stale, &stale, DATE_TOLERANCE).unwrap();
        verify_headers(&stale, &headers(&[]), DATE_TOLERANCE).unwrap();
        assert_mismatch(verify_headers(&headers(&[]), &stale, DATE_TOLERANCE));
        let other = headers(&[("Warning", "111 - Revalidation Failed")]);
        assert_mismatch(verify_headers(&other, &stale, DATE_TOLERANCE));
    }

    #[test]
    fn test_other_fields_multiset() {
        let expected = headers(&[("X-A", "1"), ("x-a", "2"), ("Server", "s")]);
        let reordered = headers(&[("server", "s"), ("X-A", "2"), ("X-A", "1")]);
        verify_headers(&reordered, &expected, DATE_TOLERANCE).unwrap();

        let e = verify_headers(&headers(&[("Server", "s")]), &expected, DATE_TOLERANCE)
            .unwrap_err();
        assert_eq!(e.etype(), &MessageMismatch);
        assert!(e.to_string().contains("missing field x-a"), "{e}");

        let doubled = headers(&[("X-A", "1"), ("x-a", "1"), ("x-a", "2"), ("Server", "s")]);
        assert_mismatch(verify_headers(&doubled, &expected, DATE_TOLERANCE));
    }

    #[test]
    fn test_verify_message() {
        let mut expected = Response::build(200).unwrap();
        expected.headers.add("Content-Length", "2");
        expected.body = "ok".into();
        let mut actual = expected.clone();
        actual.headers.add("Age", "1");
        actual.headers.add("Connection", "keep-alive");
        verify(&actual, &expected).unwrap();

        actual.body = "no".into();
        assert_mismatch(verify(&actual, &expected));

        let mut other_status = expected.clone();
        other_status.set_status(404).unwrap();
        assert_mismatch(verify(&other_status, &expected));

        let req: Message = Request::build("GET", "/").unwrap().into();
        assert_mismatch(verify_message(&req, &expected.into(), DATE_TOLERANCE));
    }
}
