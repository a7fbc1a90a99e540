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

//! HTTP/1.x request and response messages
//!
//! A message is parsed from a buffer that may not hold all of it yet: parsing fails with
//! [IncompleteMessage] until the whole message is buffered, so the caller reads more bytes and
//! tries again. Any other error is fatal for the message.

use bytes::{BufMut, Bytes, BytesMut};
use deproxy_error::{Error, ErrorType::*, OkOrErr, Result};
use http::header;
use log::debug;
use std::ops::{Deref, DerefMut};

use crate::body::{self, read_body, to_header_map, BodyFraming, MAX_HEADERS};
use crate::h2::{H2Request, H2Response};
use crate::header_map::{HeaderMultimap, CRLF};

pub const HTTP_10: &str = "HTTP/1.0";
pub const HTTP_11: &str = "HTTP/1.1";
pub const HTTP_2: &str = "HTTP/2";

/// Request methods a request line may carry: the IANA method registry plus `PURGE`.
pub const METHODS: &[&str] = &[
    "ACL",
    "BASELINE-CONTROL",
    "BIND",
    "CHECKIN",
    "CHECKOUT",
    "CONNECT",
    "COPY",
    "DELETE",
    "GET",
    "HEAD",
    "LABEL",
    "LINK",
    "LOCK",
    "MERGE",
    "MKACTIVITY",
    "MKCALENDAR",
    "MKCOL",
    "MKREDIRECTREF",
    "MKWORKSPACE",
    "MOVE",
    "OPTIONS",
    "ORDERPATCH",
    "PATCH",
    "POST",
    "PRI",
    "PROPFIND",
    "PROPPATCH",
    "PUT",
    "REBIND",
    "REPORT",
    "SEARCH",
    "TRACE",
    "UNBIND",
    "UNCHECKOUT",
    "UNLINK",
    "UNLOCK",
    "UPDATE",
    "UPDATEREDIRECTREF",
    "VERSION-CONTROL",
    "PURGE",
];

pub fn is_known_method(method: &str) -> bool {
    METHODS.contains(&method)
}

/// The parts every message variant has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageParts {
    pub version: String,
    pub headers: HeaderMultimap,
    pub trailer: HeaderMultimap,
    /// The body as it appears on the wire. Chunked bodies keep their chunk framing, see
    /// [Self::decoded_body()].
    pub body: Bytes,
}

impl MessageParts {
    pub fn new(version: impl Into<String>) -> Self {
        MessageParts {
            version: version.into(),
            ..Default::default()
        }
    }

    /// The body with the chunked transfer-coding removed, if it was applied.
    pub fn decoded_body(&self) -> Result<Bytes> {
        if self.headers.is_chunked() {
            body::decode_chunked(&self.body)
        } else {
            Ok(self.body.clone())
        }
    }

    /// Replace the body and set `Content-Length` to match. Any chunked coding is dropped.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.delete_all(header::TRANSFER_ENCODING);
        self.trailer = HeaderMultimap::new();
        self.headers
            .set(header::CONTENT_LENGTH, self.body.len().to_string());
    }

    /// Replace the body with `payload` encoded as chunks, dropping `Content-Length`.
    pub fn set_chunked_body(&mut self, payload: &[u8]) {
        self.body = body::encode_chunked(payload);
        self.headers.delete_all(header::CONTENT_LENGTH);
        self.headers.set(header::TRANSFER_ENCODING, "chunked");
    }
}

/// Behavior shared by all message variants.
///
/// A variant provides the start line hooks and its framing rules; parsing and serialization are
/// built on top of them.
pub trait HttpMessage: Sized {
    /// Parse the start line and the header block at the beginning of `buf`.
    ///
    /// Return the message without a body and the length of the head.
    fn parse_head(buf: &[u8]) -> Result<(Self, usize)>;

    /// How the body of this message is delimited.
    ///
    /// `request_method` is the method of the request a response answers.
    fn body_framing(&self, request_method: Option<&str>) -> Result<BodyFraming>;

    /// Write the start line including its CRLF.
    fn write_start_line(&self, buf: &mut BytesMut);

    fn parts(&self) -> &MessageParts;

    fn parts_mut(&mut self) -> &mut MessageParts;

    /// Whether a body shorter than the declared `Content-Length` is acceptable
    fn allows_short_body(&self) -> bool {
        false
    }

    fn write_headers(&self, buf: &mut BytesMut) {
        self.parts().headers.write_h1_wire(buf);
    }

    /// Write whatever follows the body.
    fn write_trailer(&self, buf: &mut BytesMut) {
        let parts = self.parts();
        if parts.headers.is_chunked() {
            parts.trailer.write_h1_wire(buf);
            buf.put_slice(CRLF);
        }
    }

    /// Parse one message at the beginning of `buf`, returning it with the number of bytes it
    /// takes. Bytes after that are left for the next message.
    fn parse_prefix(buf: &[u8], request_method: Option<&str>) -> Result<(Self, usize)> {
        let (mut msg, head_len) = Self::parse_head(buf)?;
        let framing = msg.body_framing(request_method)?;
        let parsed = read_body(&buf[head_len..], framing, msg.allows_short_body())?;
        let parts = msg.parts_mut();
        parts.body = parsed.body;
        parts.trailer = parsed.trailer;
        Ok((msg, head_len + parsed.consumed))
    }

    /// Parse `buf` as exactly one message.
    fn parse_exact(buf: &[u8], request_method: Option<&str>) -> Result<Self> {
        let (msg, len) = Self::parse_prefix(buf, request_method)?;
        if len < buf.len() {
            debug!("{} bytes after the end of the message", buf.len() - len);
            return Error::e_explain(
                ParseError,
                format!("{} bytes of garbage after message end", buf.len() - len),
            );
        }
        Ok(msg)
    }

    /// Serialize the message.
    fn to_wire(&self) -> Bytes {
        let parts = self.parts();
        let mut buf = BytesMut::with_capacity(256 + parts.body.len());
        self.write_start_line(&mut buf);
        self.write_headers(&mut buf);
        buf.put_slice(CRLF);
        buf.put_slice(&parts.body);
        self.write_trailer(&mut buf);
        buf.freeze()
    }
}

/// An HTTP/1.x request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    parts: MessageParts,
}

impl Deref for Request {
    type Target = MessageParts;

    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl DerefMut for Request {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

impl Request {
    /// Create an HTTP/1.1 request without headers.
    pub fn build(method: &str, uri: impl Into<String>) -> Result<Self> {
        if !is_known_method(method) {
            return Error::e_explain(ParseError, format!("unknown method {method}"));
        }
        Ok(Request {
            method: method.to_string(),
            uri: uri.into(),
            parts: MessageParts::new(HTTP_11),
        })
    }

    /// Parse `buf` as exactly one request.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::parse_exact(buf, None)
    }

    /// The target host, from `Host`.
    pub fn authority(&self) -> Option<&str> {
        self.headers.get(header::HOST)
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn is_expect_continue(&self) -> bool {
        self.version == HTTP_11
            && self
                .headers
                .get(header::EXPECT)
                .map_or(false, |v| v.eq_ignore_ascii_case("100-continue"))
    }
}

impl HttpMessage for Request {
    fn parse_head(buf: &[u8]) -> Result<(Self, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let head_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(s)) => s,
            Ok(httparse::Status::Partial) => {
                return Error::e_explain(IncompleteMessage, "incomplete request head")
            }
            Err(e) => return Error::e_because(ParseError, "invalid request head", e),
        };
        let method = req.method.or_err(ParseError, "missing method")?;
        let mut request = Request::build(method, req.path.unwrap_or_default())?;
        request.parts.version = version_str(req.version).to_string();
        request.parts.headers = to_header_map(req.headers)?;
        Ok((request, head_len))
    }

    fn body_framing(&self, _request_method: Option<&str>) -> Result<BodyFraming> {
        let headers = &self.parts.headers;
        if headers.contains(header::TRANSFER_ENCODING) {
            return if headers.is_chunked() {
                Ok(BodyFraming::Chunked)
            } else {
                Error::e_explain(ParseError, "unlimited body not allowed for requests")
            };
        }
        match body::content_length(headers)? {
            Some(len) => Ok(BodyFraming::ContentLength(len)),
            None => Ok(BodyFraming::Empty),
        }
    }

    fn write_start_line(&self, buf: &mut BytesMut) {
        buf.put_slice(self.method.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.uri.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.parts.version.as_bytes());
        buf.put_slice(CRLF);
    }

    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }

    fn allows_short_body(&self) -> bool {
        self.is_expect_continue()
    }
}

/// An HTTP/1.x response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    parts: MessageParts,
}

impl Deref for Response {
    type Target = MessageParts;

    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl DerefMut for Response {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parts
    }
}

/// The standard reason phrase of `status`, empty if there is none.
pub fn canonical_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

fn check_status(status: u16) -> Result<u16> {
    if (100..=599).contains(&status) {
        Ok(status)
    } else {
        Error::e_explain(ParseError, format!("status code {status} out of range"))
    }
}

impl Response {
    /// Create an HTTP/1.1 response with the standard reason phrase of `status`.
    pub fn build(status: u16) -> Result<Self> {
        Ok(Response {
            status: check_status(status)?,
            reason: canonical_reason(status).to_string(),
            parts: MessageParts::new(HTTP_11),
        })
    }

    /// Parse `buf` as exactly one response to a request of `request_method`.
    pub fn parse(buf: &[u8], request_method: &str) -> Result<Self> {
        Self::parse_exact(buf, Some(request_method))
    }

    pub fn set_status(&mut self, status: u16) -> Result<()> {
        self.status = check_status(status)?;
        self.reason = canonical_reason(status).to_string();
        Ok(())
    }

    /// Convert to an HTTP/2 response. Connection-specific headers are dropped and a chunked body
    /// is decoded since HTTP/2 has its own framing.
    pub fn to_h2(&self) -> Result<H2Response> {
        let mut resp = H2Response::build(self.status)?;
        for (name, value) in self
            .parts
            .headers
            .fields()
            .iter()
            .filter(|(n, _)| !crate::h2::is_connection_specific(n.as_str()))
        {
            resp.headers.add(name.to_lowercase(), value.as_str());
        }
        resp.body = self.decoded_body()?;
        resp.trailer = self
            .parts
            .trailer
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.to_string()))
            .collect();
        // the text form needs a length to find the trailer again
        if !resp.trailer.is_empty() && !resp.headers.contains(header::CONTENT_LENGTH) {
            let len = resp.body.len().to_string();
            resp.headers.add("content-length", len);
        }
        Ok(resp)
    }
}

impl HttpMessage for Response {
    fn parse_head(buf: &[u8]) -> Result<(Self, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);
        let head_len = match resp.parse(buf) {
            Ok(httparse::Status::Complete(s)) => s,
            Ok(httparse::Status::Partial) => {
                return Error::e_explain(IncompleteMessage, "incomplete response head")
            }
            Err(e) => return Error::e_because(ParseError, "invalid status line or headers", e),
        };
        let status = resp.code.or_err(ParseError, "missing status code")?;
        let response = Response {
            status: check_status(status)?,
            reason: resp.reason.unwrap_or_default().to_string(),
            parts: MessageParts {
                version: version_str(resp.version).to_string(),
                headers: to_header_map(resp.headers)?,
                ..Default::default()
            },
        };
        Ok((response, head_len))
    }

    fn body_framing(&self, request_method: Option<&str>) -> Result<BodyFraming> {
        if request_method == Some("HEAD") || matches!(self.status, 100..=199 | 204 | 304) {
            return Ok(BodyFraming::Empty);
        }
        // a successful CONNECT turns the connection into a tunnel
        if request_method == Some("CONNECT") && (200..300).contains(&self.status) {
            return Ok(BodyFraming::Empty);
        }
        let headers = &self.parts.headers;
        if headers.contains(header::TRANSFER_ENCODING) {
            return Ok(if headers.is_chunked() {
                BodyFraming::Chunked
            } else {
                BodyFraming::UntilClose
            });
        }
        match body::content_length(headers)? {
            Some(len) => Ok(BodyFraming::ContentLength(len)),
            None => Ok(BodyFraming::UntilClose),
        }
    }

    fn write_start_line(&self, buf: &mut BytesMut) {
        buf.put_slice(self.parts.version.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.reason.as_bytes());
        buf.put_slice(CRLF);
    }

    fn parts(&self) -> &MessageParts {
        &self.parts
    }

    fn parts_mut(&mut self) -> &mut MessageParts {
        &mut self.parts
    }
}

fn version_str(minor: Option<u8>) -> &'static str {
    match minor {
        Some(0) => HTTP_10,
        _ => HTTP_11,
    }
}

/// Any of the message variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
    H2Request(H2Request),
    H2Response(H2Response),
}

impl Message {
    /// Parse `buf` as an HTTP/1.x request, or as the textual header block of an HTTP/2 request
    /// when `h2` is set.
    pub fn parse_request(buf: &[u8], h2: bool) -> Result<Self> {
        Ok(if h2 {
            H2Request::parse(buf)?.into()
        } else {
            Request::parse(buf)?.into()
        })
    }

    /// Parse `buf` as a response to a request of `request_method`.
    pub fn parse_response(buf: &[u8], request_method: &str, h2: bool) -> Result<Self> {
        Ok(if h2 {
            H2Response::parse(buf, request_method)?.into()
        } else {
            Response::parse(buf, request_method)?.into()
        })
    }

    pub fn parts(&self) -> &MessageParts {
        match self {
            Message::Request(m) => m.parts(),
            Message::Response(m) => m.parts(),
            Message::H2Request(m) => m.parts(),
            Message::H2Response(m) => m.parts(),
        }
    }

    pub fn parts_mut(&mut self) -> &mut MessageParts {
        match self {
            Message::Request(m) => m.parts_mut(),
            Message::Response(m) => m.parts_mut(),
            Message::H2Request(m) => m.parts_mut(),
            Message::H2Response(m) => m.parts_mut(),
        }
    }

    pub fn to_wire(&self) -> Bytes {
        match self {
            Message::Request(m) => m.to_wire(),
            Message::Response(m) => m.to_wire(),
            Message::H2Request(m) => m.to_wire(),
            Message::H2Response(m) => m.to_wire(),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_) | Message::H2Request(_))
    }

    /// The status code of a response message
    pub fn status(&self) -> Option<u16> {
        match self {
            Message::Response(r) => Some(r.status),
            Message::H2Response(r) => r.status().ok(),
            _ => None,
        }
    }
}

impl From<Request> for Message {
    fn from(m: Request) -> Self {
        Message::Request(m)
    }
}

impl From<Response> for Message {
    fn from(m: Response) -> Self {
        Message::Response(m)
    }
}

impl From<H2Request> for Message {
    fn from(m: H2Request) -> Self {
        Message::H2Request(m)
    }
}

impl From<H2Response> for Message {
    fn from(m: H2Response) -> Self {
        Message::H2Response(m)
    }
}
