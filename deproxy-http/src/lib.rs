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

//! HTTP messages that preserve what was on the wire
//!
//! A proxy under test must be checked against the exact bytes it sends, so this crate keeps
//! header names in their original case, duplicated fields in their original order and chunked
//! bodies in their original framing. Messages serialize back to the bytes they were parsed from.
//!
//! HTTP/2 messages are represented by their decoded header block: pseudo-headers live in the same
//! [HeaderMultimap] as the regular fields.

#![allow(clippy::new_without_default)]

mod body;
mod case_header_name;
pub mod conditional;
pub mod date;
pub mod expect;
pub mod h2;
mod header_map;
pub mod message;

pub use body::{decode_chunked, encode_chunked, BodyFraming};
pub use case_header_name::{CaseHeaderName, IntoCaseHeaderName};
pub use h2::{H2Request, H2Response};
pub use header_map::{FindAll, HeaderMultimap};
pub use message::{HttpMessage, Message, MessageParts, Request, Response};

pub use http::header;

pub mod prelude {
    pub use crate::{HeaderMultimap, HttpMessage, Message, Request, Response};
}
