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

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs)]

pub use cloudcall_core::*;

mod classify;
pub use classify::Classifier;
mod client;
pub use client::{CallState, Client, ClientBuilder, PreparedCall};
mod code_table;
pub use code_table::ErrorCodeTable;
mod config;
pub use config::*;
mod decode;
pub use decode::{DecodeResponse, JsonDecoder, RawBody, XmlDecoder};
mod endpoint;
pub use endpoint::EndpointResolver;
mod executor;
pub use executor::{Executor, ExecutorOptions, PendingCall};
mod retry;
pub use retry::RetryPolicy;

pub use tokio_util::sync::CancellationToken;

/// AWS signing schemes.
pub mod aws {
    /// Signature version 2: HMAC over the canonical query string.
    pub mod v2 {
        pub use cloudcall_aws_v2::*;
    }

    /// Signature version 4: derived-key HMAC chain in the `Authorization` header.
    pub mod v4 {
        pub use cloudcall_aws_v4::*;
    }
}

/// Create a context with the reqwest transport and the OS environment.
///
/// The transport keeps at most `max_connections_per_host` idle connections
/// per host and honours `connect_timeout` when set.
#[cfg(feature = "default-context")]
pub fn default_context(config: &Config) -> Result<Context> {
    let http = cloudcall_http_send_reqwest::ReqwestHttpSend::with_pool(
        config.max_connections_per_host,
        config.connect_timeout,
    )?;
    Ok(Context::new().with_http_send(http).with_env(OsEnv))
}
