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

use http::header::{self, HeaderName};
use std::borrow::Cow;
use std::fmt;

/// A header name exactly as it was written, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseHeaderName(Cow<'static, str>);

impl CaseHeaderName {
    pub fn new(name: String) -> Self {
        CaseHeaderName(Cow::Owned(name))
    }

    pub const fn from_static(name: &'static str) -> Self {
        CaseHeaderName(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against `name`
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }

    /// HTTP/2 pseudo-headers such as `:method` start with a colon
    pub fn is_pseudo(&self) -> bool {
        self.0.starts_with(':')
    }

    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for CaseHeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A trait that converts into case-sensitive header names.
pub trait IntoCaseHeaderName {
    fn into_case_header_name(self) -> CaseHeaderName;
}

impl IntoCaseHeaderName for CaseHeaderName {
    fn into_case_header_name(self) -> CaseHeaderName {
        self
    }
}

impl IntoCaseHeaderName for String {
    fn into_case_header_name(self) -> CaseHeaderName {
        CaseHeaderName::new(self)
    }
}

impl IntoCaseHeaderName for &'static str {
    fn into_case_header_name(self) -> CaseHeaderName {
        CaseHeaderName::from_static(self)
    }
}

impl IntoCaseHeaderName for HeaderName {
    fn into_case_header_name(self) -> CaseHeaderName {
        titled_header_name(&self)
    }
}

impl IntoCaseHeaderName for &HeaderName {
    fn into_case_header_name(self) -> CaseHeaderName {
        titled_header_name(self)
    }
}

fn titled_header_name(header_name: &HeaderName) -> CaseHeaderName {
    titled_header_name_str(header_name).map_or_else(
        || CaseHeaderName::new(header_name.as_str().to_string()),
        CaseHeaderName::from_static,
    )
}

pub(crate) fn titled_header_name_str(header_name: &HeaderName) -> Option<&'static str> {
    Some(match *header_name {
        header::AGE => "Age",
        header::AUTHORIZATION => "Authorization",
        header::CACHE_CONTROL => "Cache-Control",
        header::CONNECTION => "Connection",
        header::CONTENT_TYPE => "Content-Type",
        header::CONTENT_ENCODING => "Content-Encoding",
        header::CONTENT_LENGTH => "Content-Length",
        header::DATE => "Date",
        header::ETAG => "ETag",
        header::EXPECT => "Expect",
        header::EXPIRES => "Expires",
        header::HOST => "Host",
        header::IF_MODIFIED_SINCE => "If-Modified-Since",
        header::IF_NONE_MATCH => "If-None-Match",
        header::LAST_MODIFIED => "Last-Modified",
        header::PRAGMA => "Pragma",
        header::SERVER => "Server",
        header::SET_COOKIE => "Set-Cookie",
        header::TRANSFER_ENCODING => "Transfer-Encoding",
        header::VIA => "Via",
        header::WARNING => "Warning",
        _ => {
            return None;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_header_name() {
        assert_eq!("FoO".into_case_header_name().as_str(), "FoO");
        assert_eq!("FoO".to_string().into_case_header_name().as_str(), "FoO");
        assert_eq!(header::SERVER.into_case_header_name().as_str(), "Server");
        assert_eq!(header::WARNING.into_case_header_name().as_str(), "Warning");
        assert_eq!(
            header::ACCEPT_RANGES.into_case_header_name().as_str(),
            "accept-ranges"
        );
    }

    #[test]
    fn test_matches() {
        let name = "Cache-Control".into_case_header_name();
        assert!(name.matches("cache-control"));
        assert!(name.matches("CACHE-CONTROL"));
        assert!(!name.matches("cache-contro"));
        assert!(!name.is_pseudo());
        assert!(":path".into_case_header_name().is_pseudo());
    }
}
