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

//! Message body framing

use bytes::{Bytes, BytesMut};
use deproxy_error::{Error, ErrorType::*, OkOrErr, OrErr, Result};
use http::header;
use log::{trace, warn};
use std::str;

use crate::header_map::{HeaderMultimap, CRLF};

pub(crate) const MAX_HEADERS: usize = 256;

/// How the end of a message body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// The message has no body
    Empty,
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// Exactly this many bytes
    ContentLength(usize),
    /// Everything until the connection closes
    UntilClose,
}

#[derive(Debug)]
pub(crate) struct ParsedBody {
    pub body: Bytes,
    pub trailer: HeaderMultimap,
    /// bytes of the input that belong to the body and trailer
    pub consumed: usize,
}

impl ParsedBody {
    fn plain(buf: &[u8]) -> Self {
        ParsedBody {
            body: Bytes::copy_from_slice(buf),
            trailer: HeaderMultimap::new(),
            consumed: buf.len(),
        }
    }
}

/// Read the body at the start of `buf`.
///
/// `allow_short` accepts a body shorter than its `Content-Length`, which is how a request that
/// waits for `100 Continue` arrives.
pub(crate) fn read_body(buf: &[u8], framing: BodyFraming, allow_short: bool) -> Result<ParsedBody> {
    match framing {
        BodyFraming::Empty => Ok(ParsedBody::plain(&[])),
        BodyFraming::UntilClose => Ok(ParsedBody::plain(buf)),
        BodyFraming::ContentLength(size) => {
            if buf.len() >= size {
                Ok(ParsedBody::plain(&buf[..size]))
            } else if allow_short {
                trace!("short body tolerated: {} of {size} bytes", buf.len());
                Ok(ParsedBody::plain(buf))
            } else {
                Error::e_explain(
                    IncompleteMessage,
                    format!("body has {} of {size} bytes", buf.len()),
                )
            }
        }
        BodyFraming::Chunked => read_chunked_body(buf),
    }
}

// The raw chunked encoding is kept as the body so that the message serializes back to the same
// bytes. The body ends right after the `0\r\n` line, the trailer section follows.
fn read_chunked_body(buf: &[u8]) -> Result<ParsedBody> {
    let mut pos = 0;
    loop {
        let (header_len, size) = next_chunk(&buf[pos..])?;
        pos += header_len;
        if size == 0 {
            break;
        }
        let next = chunk_end(pos, size)?;
        let Some(delimiter) = buf.get(next - CRLF.len()..next) else {
            return Error::e_explain(IncompleteMessage, "incomplete chunk in chunked body");
        };
        if delimiter != CRLF {
            return Error::e_explain(
                ParseError,
                format!("chunk of {size} bytes is not followed by CRLF"),
            );
        }
        pos = next;
    }
    let body = Bytes::copy_from_slice(&buf[..pos]);

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let (trailer_len, trailer) = match httparse::parse_headers(&buf[pos..], &mut headers) {
        Ok(httparse::Status::Complete((len, fields))) => (len, to_header_map(fields)?),
        Ok(httparse::Status::Partial) => {
            return Error::e_explain(IncompleteMessage, "incomplete trailer in chunked body")
        }
        Err(e) => return Error::e_because(ParseError, "invalid trailer in chunked body", e),
    };
    Ok(ParsedBody {
        body,
        trailer,
        consumed: pos + trailer_len,
    })
}

// Where the chunk of `size` bytes starting at `pos` ends, including its CRLF.
fn chunk_end(pos: usize, size: usize) -> Result<usize> {
    pos.checked_add(size)
        .and_then(|end| end.checked_add(CRLF.len()))
        .or_err_with(ParseError, || format!("chunk size {size} out of range"))
}

// Return the length of the chunk-size line and the chunk size.
fn next_chunk(buf: &[u8]) -> Result<(usize, usize)> {
    match httparse::parse_chunk_size(buf) {
        Ok(httparse::Status::Complete((header_len, size))) => {
            trace!("chunk of size {size}, header length {header_len}");
            let size = usize::try_from(size).or_err(ParseError, "chunk size overflow")?;
            Ok((header_len, size))
        }
        Ok(httparse::Status::Partial) => {
            Error::e_explain(IncompleteMessage, "incomplete chunk size line")
        }
        Err(_) => Error::e_explain(
            ParseError,
            format!(
                "invalid chunk size line: {}",
                String::from_utf8_lossy(&buf[..buf.len().min(16)]).escape_default()
            ),
        ),
    }
}

/// Strip the chunked transfer-coding from a raw chunked body.
pub fn decode_chunked(raw: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(raw.len());
    let mut pos = 0;
    loop {
        let rest = raw
            .get(pos..)
            .or_err(IncompleteMessage, "chunked body ends inside a chunk")?;
        let (header_len, size) = next_chunk(rest)?;
        pos += header_len;
        if size == 0 {
            return Ok(out.freeze());
        }
        let next = chunk_end(pos, size)?;
        let data = raw
            .get(pos..next - CRLF.len())
            .or_err(IncompleteMessage, "incomplete chunk in chunked body")?;
        out.extend_from_slice(data);
        pos = next;
    }
}

/// Encode `payload` as a single chunk followed by the last chunk.
pub fn encode_chunked(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 16);
    if !payload.is_empty() {
        out.extend_from_slice(format!("{:x}", payload.len()).as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(payload);
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(b"0");
    out.extend_from_slice(CRLF);
    out.freeze()
}

pub(crate) fn to_header_map(fields: &[httparse::Header]) -> Result<HeaderMultimap> {
    let mut map = HeaderMultimap::with_capacity(fields.len());
    for field in fields.iter().filter(|f| !f.name.is_empty()) {
        let value = str::from_utf8(field.value).or_err_with(InvalidHTTPHeader, || {
            format!("value of {} is not valid utf-8", field.name)
        })?;
        map.add(field.name.to_string(), value);
    }
    Ok(map)
}

/// The `Content-Length` of `headers`, `None` when absent.
///
/// Repeated fields, or a comma separated list, must all carry the same value.
pub(crate) fn content_length(headers: &HeaderMultimap) -> Result<Option<usize>> {
    let mut length = None;
    for value in headers
        .find_all(header::CONTENT_LENGTH)
        .flat_map(|v| v.split(','))
    {
        let len = buf_to_content_length(value)?;
        match length {
            Some(first) if first != len => {
                return Error::e_explain(
                    ParseError,
                    format!("conflicting content-length {first} and {len}"),
                );
            }
            _ => length = Some(len),
        }
    }
    Ok(length)
}

/// Parse a `Content-Length` value.
pub(crate) fn buf_to_content_length(value: &str) -> Result<usize> {
    match value.trim().parse::<i64>() {
        Ok(len) if len >= 0 => {
            usize::try_from(len).or_err(ParseError, "content-length out of range")
        }
        Ok(len) => {
            warn!("negative content-length header value {len}");
            Error::e_explain(ParseError, format!("negative content-length {len}"))
        }
        Err(e) => {
            warn!("invalid content-length header value {value}");
            Error::e_because(ParseError, format!("invalid content-length {value}"), e)
        }
    }
}
