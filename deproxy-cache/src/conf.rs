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

//! Cache configuration
//!
//! The configuration decides:
//! * which request methods are cached
//! * which `Cache-Control` directives are ignored
//! * which response headers are never stored
//! * which upstream statuses may be replaced with a stale response
//! * who may evict entries with `PURGE`
//! * where the upstream is and how long to wait for it

use deproxy_error::{Error, ErrorType::*, OrErr, Result};
use ipnet::IpNet;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::time::Duration;

use crate::freshness::StatusPattern;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConf {
    pub version: usize,
    /// Only a shared cache is supported, so this must be true
    pub shared_cache: bool,
    /// Request methods whose responses are cached, case-sensitive
    pub cache_methods: Vec<String>,
    /// `Cache-Control` directive names treated as absent on requests and responses
    pub cache_control_ignore: Vec<String>,
    /// Response header names removed before a response is stored
    pub cache_resp_hdr_del: Vec<String>,
    /// Status patterns such as `500` or `5*`. An entry may hold several patterns separated by
    /// spaces.
    pub cache_use_stale: Vec<String>,
    /// How long a request waits for another one filling the same key
    pub cache_lock_timeout_ms: u64,
    /// Handle `PURGE` requests instead of forwarding them
    pub cache_purge: bool,
    /// Client addresses or networks such as `10.0.0.1` or `10.0.0.0/8` allowed to purge. An
    /// entry may hold several separated by spaces. Nobody may purge when empty.
    pub cache_purge_acl: Vec<String>,
    /// A `PURGE` carrying this header with a cached method as its value also refetches the
    /// resource with that method
    pub cache_purge_refresh_header: String,
    /// `host:port` of the upstream
    pub upstream: String,
    pub upstream_connect_timeout_ms: u64,
    /// How long to wait for the whole upstream response
    pub upstream_timeout_ms: u64,
}

impl Default for CacheConf {
    fn default() -> Self {
        CacheConf {
            version: 0,
            shared_cache: true,
            cache_methods: vec!["GET".to_string(), "HEAD".to_string()],
            cache_control_ignore: vec![],
            cache_resp_hdr_del: vec![],
            cache_use_stale: vec![],
            cache_lock_timeout_ms: 5000,
            cache_purge: false,
            cache_purge_acl: vec![],
            cache_purge_refresh_header: "X-Cache-Refresh".to_string(),
            upstream: "127.0.0.1:8000".to_string(),
            upstream_connect_timeout_ms: 1000,
            upstream_timeout_ms: 3000,
        }
    }
}

impl CacheConf {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let mut file = File::open(&path)
            .or_err_with(FileOpenError, || format!("Unable to open conf file {path}"))?;
        let mut conf_str = String::new();
        file.read_to_string(&mut conf_str)
            .or_err_with(FileReadError, || format!("Unable to read conf file {path}"))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn new() -> Option<Self> {
        Self::from_yaml("---\nversion: 1").ok()
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: CacheConf = serde_yaml::from_str(conf_str).or_err_with(InvalidConfig, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");
        conf.validate()
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).or_err(InternalError, "Unable to serialize conf")
    }

    pub fn validate(self) -> Result<Self> {
        if !self.shared_cache {
            return Error::e_explain(InvalidConfig, "only a shared cache is supported");
        }
        if self.upstream_timeout_ms == 0 || self.upstream_connect_timeout_ms == 0 {
            return Error::e_explain(InvalidConfig, "upstream timeouts must not be 0");
        }
        self.use_stale_patterns()?;
        self.purge_acl()?;
        Ok(self)
    }

    /// All the patterns of `cache_use_stale`
    pub fn use_stale_patterns(&self) -> Result<Vec<StatusPattern>> {
        self.cache_use_stale
            .iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(|p| p.parse::<StatusPattern>())
            .collect()
    }

    /// All the networks of `cache_purge_acl`. A plain address is a network of one.
    pub fn purge_acl(&self) -> Result<Vec<IpNet>> {
        self.cache_purge_acl
            .iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(|net| {
                net.parse::<IpNet>()
                    .or_else(|_| net.parse::<IpAddr>().map(IpNet::from))
                    .or_err_with(InvalidConfig, || format!("invalid cache_purge_acl {net}"))
            })
            .collect()
    }

    pub fn is_cache_method(&self, method: &str) -> bool {
        self.cache_methods.iter().any(|m| m == method)
    }

    pub fn cache_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_lock_timeout_ms)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_connect_timeout_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}
