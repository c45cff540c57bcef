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

//! Seam for per-service success-body decoders.

use bytes::Bytes;
use cloudcall_core::{Error, Result, TransportResponse};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// DecodeResponse turns a successful response into a domain value.
///
/// Implementations live with the per-service action catalogs. Failures
/// should be reported with `Error::decode_failed`.
pub trait DecodeResponse: Send + Sync {
    /// The decoded value.
    type Output;

    /// Decode `resp`, whose status is always 2xx.
    fn decode(&self, resp: &TransportResponse) -> Result<Self::Output>;
}

/// Returns the body unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBody;

impl DecodeResponse for RawBody {
    type Output = Bytes;

    fn decode(&self, resp: &TransportResponse) -> Result<Bytes> {
        Ok(resp.body().clone())
    }
}

/// Decodes a JSON body into `T` with `serde_json`.
pub struct JsonDecoder<T>(PhantomData<fn() -> T>);

impl<T> JsonDecoder<T> {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonDecoder")
    }
}

impl<T: DeserializeOwned> DecodeResponse for JsonDecoder<T> {
    type Output = T;

    fn decode(&self, resp: &TransportResponse) -> Result<T> {
        serde_json::from_slice(resp.body()).map_err(|e| {
            Error::decode_failed(format!("invalid json body: {e}"))
                .with_status(resp.status())
                .with_source(e)
        })
    }
}

/// Decodes an XML body into `T` with `quick-xml`.
pub struct XmlDecoder<T>(PhantomData<fn() -> T>);

impl<T> XmlDecoder<T> {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for XmlDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for XmlDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("XmlDecoder")
    }
}

impl<T: DeserializeOwned> DecodeResponse for XmlDecoder<T> {
    type Output = T;

    fn decode(&self, resp: &TransportResponse) -> Result<T> {
        let text = std::str::from_utf8(resp.body()).map_err(|e| {
            Error::decode_failed("xml body is not valid utf-8")
                .with_status(resp.status())
                .with_source(e)
        })?;
        quick_xml::de::from_str(text).map_err(|e| {
            Error::decode_failed(format!("invalid xml body: {e}"))
                .with_status(resp.status())
                .with_source(e)
        })
    }
}
