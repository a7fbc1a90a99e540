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

//! HTTP/2 messages in their decoded header-block form
//!
//! There is no start line: method, path, scheme, authority and status are pseudo-headers kept in
//! the header map ahead of the regular fields. The text form is one `name: value` line per field
//! followed by an empty line and the body, which is delimited by the HTTP/2 frames and therefore
//! runs to the end of the buffer unless `content-length` says otherwise. A trailer is written
//! after the body as another header block. It is only found again when `content-length` ends
//! the body; without one the trailer reads back as part of the body.

use bytes::{BufMut, BytesMut};
use deproxy_error::{Error, ErrorType::*, OkOrErr, OrErr, Result};
use http::header;
use std::ops::{Deref, DerefMut};
use std::str;

use crate::body::{self, BodyFraming};
use crate::header_map::{write_field, HeaderMultimap, CRLF};
use crate::message::{canonical_reason, is_known_method, HttpMessage, MessageParts, Request};
use crate::message::{HTTP_11, HTTP_2};

pub const METHOD: &str = ":method";
pub const PATH: &str = ":path";
pub const SCHEME: &str = ":scheme";
pub const AUTHORITY: &str = ":authority";
pub const STATUS: &str = ":status";

const REQUEST_PSEUDO_HEADERS: &[&str] = &[METHOD, PATH, SCHEME, AUTHORITY];
const RESPONSE_PSEUDO_HEADERS: &[&str] = &[STATUS];

/// Fields that only make sense on an HTTP/1.x connection and make an HTTP/2 message malformed
/// (RFC 9113 §8.2.2).
pub fn is_connection_specific(name: &str) -> bool {
    ["connection", "keep-alive", "proxy-connection", "transfer-encoding", "upgrade"]
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

// Parse the header block: one field per line until an empty line.
fn parse_header_block(buf: &[u8], allowed_pseudo: &[&str]) -> Result<(HeaderMultimap, usize)> {
    let mut headers = HeaderMultimap::new();
    let mut seen_regular = false;
    let mut pos = 0;
    loop {
        let rest = &buf[pos..];
        let eol = rest
            .iter()
            .position(|b| *b == b'\n')
            .or_err(IncompleteMessage, "incomplete header block")?;
        pos += eol + 1;
        let line = rest[..eol].strip_suffix(b"\r").unwrap_or(&rest[..eol]);
        if line.is_empty() {
            break;
        }
        let line = str::from_utf8(line).or_err(InvalidHTTPHeader, "header line is not utf-8")?;
        // the colon that starts a pseudo-header name is not the delimiter
        let (pseudo, unprefixed) = match line.strip_prefix(':') {
            Some(l) => (true, l),
            None => (false, line),
        };
        let (name, value) = unprefixed
            .split_once(':')
            .or_err_with(ParseError, || format!("header line without a colon: {line}"))?;
        let name = name.trim();
        if name.is_empty() || name.bytes().any(|b| b.is_ascii_uppercase()) {
            return Error::e_explain(InvalidH2, format!("invalid field name {name:?}"));
        }
        let value = value.trim();
        if pseudo {
            let name = format!(":{name}");
            if seen_regular {
                return Error::e_explain(InvalidH2, format!("{name} after a regular field"));
            }
            if !allowed_pseudo.contains(&name.as_str()) {
                return Error::e_explain(InvalidH2, format!("unexpected pseudo-header {name}"));
            }
            if headers.contains(&name) {
                return Error::e_explain(InvalidH2, format!("duplicated pseudo-header {name}"));
            }
            headers.add(name, value);
        } else {
            if is_connection_specific(name) {
                return Error::e_explain(InvalidH2, format!("connection-specific field {name}"));
            }
            seen_regular = true;
            headers.add(name.to_string(), value);
        }
    }
    Ok((headers, pos))
}

// Like HttpMessage::parse_prefix(), plus the trailer block after a sized body.
fn parse_h2_prefix<M: HttpMessage>(
    buf: &[u8],
    request_method: Option<&str>,
) -> Result<(M, usize)> {
    let (mut msg, head_len) = M::parse_head(buf)?;
    let framing = msg.body_framing(request_method)?;
    let parsed = body::read_body(&buf[head_len..], framing, false)?;
    let mut len = head_len + parsed.consumed;
    let parts = msg.parts_mut();
    parts.body = parsed.body;
    if matches!(framing, BodyFraming::ContentLength(_)) && len < buf.len() {
        let (trailer, trailer_len) = parse_header_block(&buf[len..], &[])?;
        parts.trailer = trailer;
        len += trailer_len;
    }
    Ok((msg, len))
}

fn write_h2_trailer(trailer: &HeaderMultimap, buf: &mut BytesMut) {
    if !trailer.is_empty() {
        trailer.write_h1_wire(buf);
        buf.put_slice(CRLF);
    }
}

fn h2_body_framing(headers: &HeaderMultimap) -> Result<BodyFraming> {
    match body::content_length(headers)? {
        Some(len) => Ok(BodyFraming::ContentLength(len)),
        None => Ok(BodyFraming::UntilClose),
    }
}

// Pseudo-headers go first no matter where they were added.
fn write_h2_headers(headers: &HeaderMultimap, buf: &mut BytesMut) {
    let (pseudo, regular): (Vec<_>, Vec<_>) =
        headers.fields().iter().partition(|(n, _)| n.is_pseudo());
    for (name, value) in pseudo.into_iter().chain(regular) {
        write_field(name, value, buf);
    }
}

/// An HTTP/2 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Request {
    parts: MessageParts,
}

impl Deref for H2Request {
    type Target = MessageParts;

    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl DerefMut for H2Request {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

impl H2Request {
    /// Create a request with all four request pseudo-headers.
    pub fn build(method: &str, scheme: &str, authority: &str, path: &str) -> Result<Self> {
        if !is_known_method(method) {
            return Error::e_explain(ParseError, format!("unknown method {method}"));
        }
        let mut parts = MessageParts::new(HTTP_2);
        parts.headers.add(METHOD, method.to_string());
        parts.headers.add(SCHEME, scheme.to_string());
        parts.headers.add(AUTHORITY, authority.to_string());
        parts.headers.add(PATH, path.to_string());
        Ok(H2Request { parts })
    }

    /// Parse `buf` as exactly one request.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_exact(buf, None)
    }

    pub fn method(&self) -> Option<&str> {
        self.headers.get(METHOD)
    }

    pub fn path(&self) -> Option<&str> {
        self.headers.get(PATH)
    }

    pub fn authority(&self) -> Option<&str> {
        self.headers.get(AUTHORITY)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.headers.get(SCHEME)
    }

    /// Convert to the HTTP/1.1 request a proxy would send upstream.
    ///
    /// `:authority` becomes `Host` unless the request has one. The body gets a `Content-Length`,
    /// or chunked framing when there is a trailer to carry.
    pub fn to_h1(&self) -> Result<Request> {
        let method = self.method().or_err(InvalidH2, "missing :method")?;
        let path = self.path().or_err(InvalidH2, "missing :path")?;
        let mut req = Request::build(method, path)?;
        req.version = HTTP_11.to_string();
        if let (Some(authority), false) = (self.authority(), self.headers.contains(header::HOST))
        {
            req.headers.add(header::HOST, authority.to_string());
        }
        for (name, value) in self.parts.headers.fields().iter().filter(|(n, _)| !n.is_pseudo()) {
            req.headers.add(name.clone(), value.as_str());
        }
        if !self.trailer.is_empty() {
            req.set_chunked_body(&self.body);
            req.trailer = self.trailer.clone();
        } else if !self.body.is_empty() && !req.headers.contains(header::CONTENT_LENGTH) {
            req.set_body(self.body.clone());
        } else {
            req.body = self.body.clone();
        }
        Ok(req)
    }
}

impl HttpMessage for H2Request {
    fn parse_head(buf: &[u8]) -> Result<(Self, usize)> {
        let (headers, len) = parse_header_block(buf, REQUEST_PSEUDO_HEADERS)?;
        let method = headers.get(METHOD).or_err(InvalidH2, "missing :method")?;
        if !is_known_method(method) {
            return Error::e_explain(ParseError, format!("unknown method {method}"));
        }
        if !headers.contains(PATH) {
            return Error::e_explain(InvalidH2, "missing :path");
        }
        let mut parts = MessageParts::new(HTTP_2);
        parts.headers = headers;
        Ok((H2Request { parts }, len))
    }

    fn body_framing(&self, _request_method: Option<&str>) -> Result<BodyFraming> {
        h2_body_framing(&self.parts.headers)
    }

    fn write_start_line(&self, _buf: &mut BytesMut) {}

    fn write_headers(&self, buf: &mut BytesMut) {
        write_h2_headers(&self.parts.headers, buf);
    }

    fn write_trailer(&self, buf: &mut BytesMut) {
        write_h2_trailer(&self.parts.trailer, buf);
    }

    fn parse_prefix(buf: &[u8], request_method: Option<&str>) -> Result<(Self, usize)> {
        parse_h2_prefix(buf, request_method)
    }

    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}

/// An HTTP/2 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Response {
    parts: MessageParts,
}

impl Deref for H2Response {
    type Target = MessageParts;

    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl DerefMut for H2Response {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

impl H2Response {
    pub fn build(status: u16) -> Result<Self> {
        let mut parts = MessageParts::new(HTTP_2);
        parts.headers.add(STATUS, parse_status(&status.to_string())?.to_string());
        Ok(H2Response { parts })
    }

    /// Parse `buf` as exactly one response to a request of `request_method`.
    pub fn parse(buf: &[u8], request_method: &str) -> Result<Self> {
        Self::parse_exact(buf, Some(request_method))
    }

    pub fn status(&self) -> Result<u16> {
        parse_status(self.headers.get(STATUS).or_err(InvalidH2, "missing :status")?)
    }

    /// The standard reason phrase for the status, HTTP/2 has none on the wire.
    pub fn reason(&self) -> &'static str {
        self.status().map_or("", canonical_reason)
    }
}

fn parse_status(value: &str) -> Result<u16> {
    let status: u16 = value
        .parse()
        .or_err_with(ParseError, || format!("invalid :status {value}"))?;
    if !(100..=599).contains(&status) {
        return Error::e_explain(ParseError, format!("status code {status} out of range"));
    }
    Ok(status)
}

impl HttpMessage for H2Response {
    fn parse_head(buf: &[u8]) -> Result<(Self, usize)> {
        let (headers, len) = parse_header_block(buf, RESPONSE_PSEUDO_HEADERS)?;
        parse_status(headers.get(STATUS).or_err(InvalidH2, "missing :status")?)?;
        let mut parts = MessageParts::new(HTTP_2);
        parts.headers = headers;
        Ok((H2Response { parts }, len))
    }

    fn body_framing(&self, request_method: Option<&str>) -> Result<BodyFraming> {
        let status = self.status()?;
        if request_method == Some("HEAD") || matches!(status, 100..=199 | 204 | 304) {
            return Ok(BodyFraming::Empty);
        }
        h2_body_framing(&self.parts.headers)
    }

    fn write_start_line(&self, _buf: &mut BytesMut) {}

    fn write_headers(&self, buf: &mut BytesMut) {
        write_h2_headers(&self.parts.headers, buf);
    }

    fn write_trailer(&self, buf: &mut BytesMut) {
        write_h2_trailer(&self.parts.trailer, buf);
    }

    fn parse_prefix(buf: &[u8], request_method: Option<&str>) -> Result<(Self, usize)> {
        parse_h2_prefix(buf, request_method)
    }

    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}
