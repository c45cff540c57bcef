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

//! Core components for signed, asynchronous calls to cloud provider APIs.
//!
//! This crate holds everything a signing scheme or a transport needs to
//! agree on: the request data model, the canonicalizer, the error taxonomy
//! and the traits at each seam.
//!
//! ## Traits
//!
//! - [`HttpSend`]: For sending HTTP requests
//! - [`Env`]: For environment variable access
//! - [`ProvideCredential`]: For loading credentials from various sources
//! - [`SignRequest`]: For signing schemes
//!
//! ## Utilities
//!
//! - [`canonical`]: Canonical request construction
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time manipulation utilities
//! - [`utils`]: General utilities including data redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod canonical;
pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, HttpSend, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};
mod error;
pub use error::{Error, ErrorCategory, ErrorKind, Result, TransportFailure};
mod credential;
pub use credential::{Credential, RotatingCredentialProvider, StaticCredentialProvider};
mod endpoint;
pub use endpoint::Endpoint;

mod api;
pub use api::{ProvideCredential, SignRequest, SigningScheme};
mod request;
pub use request::{ActionRequest, SignedRequest, SigningRequest};

/// TransportResponse is the raw response produced by the executor.
pub type TransportResponse = http::Response<bytes::Bytes>;
