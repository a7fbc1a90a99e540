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

//! Forwarding requests to the upstream

use async_trait::async_trait;
use bytes::BytesMut;
use deproxy_error::{Error, ErrorType::*, OrErr, Result};
use deproxy_http::{BodyFraming, HttpMessage, Request, Response};
use log::{debug, trace};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::conf::CacheConf;

const INIT_BUF_SIZE: usize = 4096;

/// Something that answers the requests the cache can't
#[async_trait]
pub trait Forward: Send + Sync {
    /// Send `req` upstream and return the complete response.
    ///
    /// Errors carry [deproxy_error::ErrorSource::Upstream] and map to the status the client
    /// should see through [Error::status_code()].
    async fn forward(&self, req: &Request) -> Result<Response>;
}

/// Forward over a new HTTP/1.x connection per request
#[derive(Debug, Clone)]
pub struct TcpForwarder {
    addr: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpForwarder {
    /// `read_timeout` bounds the whole response, from the end of the request write to the last
    /// byte.
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, read_timeout: Duration) -> Self {
        TcpForwarder {
            addr: addr.into(),
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_conf(conf: &CacheConf) -> Self {
        Self::new(
            conf.upstream.as_str(),
            conf.upstream_connect_timeout(),
            conf.upstream_timeout(),
        )
    }

    async fn connect(&self) -> Result<TcpStream> {
        let t = self.connect_timeout;
        let conn_res = timeout(t, TcpStream::connect(self.addr.as_str()))
            .await
            .explain_err(ConnectTimedout, |_| {
                format!("timeout {t:?} connecting to server {}", self.addr)
            })?;
        match conn_res {
            Ok(stream) => {
                debug!("connected to new server: {}", self.addr);
                Ok(stream)
            }
            Err(e) => {
                let etype = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    ConnectRefused
                } else {
                    ConnectError
                };
                Error::e_because(etype, format!("Fail to connect to {}", self.addr), e)
            }
        }
    }

    async fn forward_inner(&self, req: &Request) -> Result<Response> {
        let mut stream = self.connect().await?;
        stream
            .write_all(&req.to_wire())
            .await
            .or_err(WriteError, "while writing request")?;
        let t = self.read_timeout;
        timeout(t, read_response(&mut stream, &req.method))
            .await
            .map_err(|_| Error::explain(ReadTimedout, format!("timeout {t:?} reading response")))?
    }
}

#[async_trait]
impl Forward for TcpForwarder {
    async fn forward(&self, req: &Request) -> Result<Response> {
        let resp = self.forward_inner(req).await.map_err(|e| {
            e.into_up()
                .more_context(format!("{} {} via {}", req.method, req.uri, self.addr))
        })?;
        debug!("upstream answered {} {} with {}", req.method, req.uri, resp.status);
        Ok(resp)
    }
}

/// Read one response to a `method` request from `stream`.
///
/// The buffer is parsed again after every read until it holds a complete message. A body
/// delimited by the end of the connection is complete once `stream` reaches EOF.
pub async fn read_response<S>(stream: &mut S, method: &str) -> Result<Response>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(INIT_BUF_SIZE);
    loop {
        let n = stream
            .read_buf(&mut buf)
            .await
            .or_err_with(ReadError, || {
                format!("while reading response, bytes already read: {}", buf.len())
            })?;
        let eof = n == 0;
        trace!("read {n} bytes, {} in total", buf.len());
        match Response::parse_prefix(&buf, Some(method)) {
            Ok((resp, len)) => {
                if !eof && resp.body_framing(Some(method))? == BodyFraming::UntilClose {
                    continue;
                }
                if len < buf.len() {
                    debug!("ignoring {} bytes after the response", buf.len() - len);
                }
                return Ok(resp);
            }
            Err(e) if e.etype().is_incomplete() => {
                if eof {
                    return Error::e_explain(
                        ConnectionClosed,
                        format!("closed before the response completed, bytes read: {}", buf.len()),
                    );
                }
            }
            Err(e) => return Err(e),
        }
    }
}
