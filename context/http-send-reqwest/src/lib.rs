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

//! [`HttpSend`] implementation on top of a shared [`reqwest::Client`].
//!
//! The client keeps idle connections per host, so calls to the same host
//! reuse connections while every request stays independently signed and
//! independently timed out by the caller.

use async_trait::async_trait;
use bytes::Bytes;
use cloudcall_core::{Error, HttpSend, Result, TransportFailure};
use http_body_util::BodyExt;
use log::debug;
use reqwest::{Client, Request};
use std::error::Error as _;
use std::io;
use std::time::Duration;

/// HttpSend backed by reqwest.
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client keeping at most `max_idle_per_host` idle connections
    /// per host, with an optional connect deadline.
    pub fn with_pool(max_idle_per_host: usize, connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().pool_max_idle_per_host(max_idle_per_host);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config_invalid("failed to build http client").with_source(e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = Request::try_from(req)
            .map_err(|e| Error::request_invalid("request is not sendable").with_source(e))?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(into_transport_error)?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(into_transport_error)?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

fn into_transport_error(err: reqwest::Error) -> Error {
    let cause = classify(&err);
    debug!("http send failed with {cause}: {err}");
    Error::transport(cause, format!("http send failed: {cause}")).with_source(err)
}

/// Map a reqwest failure onto the transport taxonomy by walking its source
/// chain.
fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout;
    }

    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            match io.kind() {
                io::ErrorKind::ConnectionRefused => return TransportFailure::ConnectionRefused,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => return TransportFailure::ConnectionReset,
                io::ErrorKind::TimedOut => return TransportFailure::Timeout,
                _ => {}
            }
        }

        let msg = e.to_string().to_lowercase();
        if msg.contains("dns error") || msg.contains("failed to lookup address") {
            return TransportFailure::Dns;
        }
        if msg.contains("certificate") || msg.contains("tls") || msg.contains("handshake") {
            return TransportFailure::Tls;
        }
        source = e.source();
    }

    if err.is_connect() {
        TransportFailure::ConnectionRefused
    } else if err.is_body() || err.is_decode() {
        TransportFailure::ConnectionReset
    } else {
        TransportFailure::Other
    }
}
