// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::{Error, Result};
use http::uri::Scheme;
use http::Uri;
use std::fmt;

/// Endpoint is the resolved base address of one service in one region.
///
/// It also carries the region a request to this address must be signed for,
/// which differs from the requested region for global services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
    signing_region: String,
}

impl Endpoint {
    /// Create an endpoint for `host` using `scheme`.
    pub fn new(scheme: Scheme, host: impl Into<String>, signing_region: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
            port: None,
            path: String::new(),
            signing_region: signing_region.into(),
        }
    }

    /// Create an https endpoint.
    pub fn https(host: impl Into<String>, signing_region: impl Into<String>) -> Self {
        Self::new(Scheme::HTTPS, host, signing_region)
    }

    /// Parse an explicit base URI such as `http://localhost:4566/prefix`.
    ///
    /// Only `http` and `https` are accepted, a host is required and a query
    /// string is rejected.
    pub fn parse(uri: &str, signing_region: impl Into<String>) -> Result<Self> {
        let parsed: Uri = uri.parse()?;

        let scheme = match parsed.scheme() {
            Some(s) if *s == Scheme::HTTP || *s == Scheme::HTTPS => s.clone(),
            Some(s) => {
                return Err(Error::config_invalid(format!(
                    "endpoint {uri} has unsupported scheme {s}"
                )))
            }
            None => return Err(Error::config_invalid(format!("endpoint {uri} has no scheme"))),
        };
        let host = match parsed.host() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(Error::config_invalid(format!("endpoint {uri} has no host"))),
        };
        if parsed.query().is_some() {
            return Err(Error::config_invalid(format!(
                "endpoint {uri} must not carry a query string"
            )));
        }

        Ok(Self {
            scheme,
            host,
            port: parsed.port_u16(),
            path: parsed.path().trim_end_matches('/').to_string(),
            signing_region: signing_region.into(),
        })
    }

    /// Set an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set a path prefix that is prepended to every request path.
    pub fn with_path(mut self, path: &str) -> Self {
        let path = path.trim_end_matches('/');
        self.path = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self
    }

    /// Sign requests to this endpoint for `region`.
    pub fn with_signing_region(mut self, region: impl Into<String>) -> Self {
        self.signing_region = region.into();
        self
    }

    /// Scheme of this endpoint.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Host name without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path prefix, empty when the endpoint is served from the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Region requests to this endpoint are signed for.
    pub fn signing_region(&self) -> &str {
        &self.signing_region
    }

    /// Host with the port appended when it is not the scheme's default.
    ///
    /// This is the exact value sent (and signed) as the `Host` header.
    pub fn authority(&self) -> String {
        let default_port = if self.scheme == Scheme::HTTPS { 443 } else { 80 };
        match self.port {
            Some(port) if port != default_port => format!("{}:{}", self.host, port),
            _ => self.host.clone(),
        }
    }

    /// Join a request path onto the endpoint prefix.
    pub fn join(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        format!("{}{}", self.path, path)
    }

    /// The fully qualified base URI.
    pub fn uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
