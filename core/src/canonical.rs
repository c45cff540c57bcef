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

//! Canonical request construction shared by every signing scheme.
//!
//! Ordering and encoding here must match the remote verifier byte for byte.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// - URI encode every byte except the unreserved characters: 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
pub static QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same as [`QUERY_ENCODE_SET`] but keeps `/` so that path segments survive.
pub static PATH_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a query name or value per RFC 3986.
///
/// Space becomes `%20` and `+` becomes `%2B`; form-style `+` for space is
/// never produced.
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, &QUERY_ENCODE_SET).to_string()
}

/// Percent-encode a request path, keeping `/` separators.
pub fn encode_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    utf8_percent_encode(path, &PATH_ENCODE_SET).to_string()
}

/// Sort raw (name, value) pairs byte-wise by name, ties broken by value, and
/// percent-encode both sides.
///
/// Empty names and names or values containing NUL cannot be represented and
/// are rejected.
pub fn canonicalize_query(params: &[(String, String)]) -> Result<Vec<(String, String)>> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    sorted
        .into_iter()
        .map(|(k, v)| {
            if k.is_empty() {
                return Err(Error::request_invalid("query parameter name must not be empty"));
            }
            if k.contains('\0') || v.contains('\0') {
                return Err(Error::request_invalid(format!(
                    "query parameter {k} contains a NUL byte"
                )));
            }
            Ok((percent_encode(k), percent_encode(v)))
        })
        .collect()
}

/// Canonicalize the headers selected by `filter`.
///
/// Names are lower-cased, values trimmed with inner runs of spaces collapsed,
/// repeated headers joined with `,`, and the result sorted by name.
pub fn canonicalize_headers(
    headers: &HeaderMap,
    filter: impl Fn(&HeaderName) -> bool,
) -> Result<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = Vec::new();

    for name in headers.keys().filter(|name| filter(name)) {
        let mut values = Vec::new();
        for value in headers.get_all(name) {
            let value = value.to_str().map_err(|e| {
                Error::request_invalid(format!("header {name} is not representable as text"))
                    .with_source(e)
            })?;
            values.push(normalize_header_value(value));
        }
        out.push((name.as_str().to_lowercase(), values.join(",")));
    }

    out.sort();
    Ok(out)
}

fn normalize_header_value(v: &str) -> String {
    let mut s = String::with_capacity(v.len());
    for (idx, part) in v.split(char::is_whitespace).filter(|p| !p.is_empty()).enumerate() {
        if idx > 0 {
            s.push(' ');
        }
        s.push_str(part);
    }
    s
}

/// CanonicalRequest is the deterministic signature input derived from one
/// request.
///
/// Query pairs and headers are already encoded and sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// HTTP method.
    pub method: Method,
    /// Value of the `Host` header.
    pub host: String,
    /// Encoded request path.
    pub path: String,
    /// Encoded, sorted query pairs.
    pub query: Vec<(String, String)>,
    /// Signed headers as (lower-cased name, normalized value), sorted.
    pub headers: Vec<(String, String)>,
    /// Hex encoded payload hash or `UNSIGNED-PAYLOAD`, for schemes that bind the body.
    pub payload_hash: Option<String>,
}

impl CanonicalRequest {
    /// Render the canonical query string: `a=1&b=2`.
    pub fn query_string(&self) -> String {
        let mut s = String::with_capacity(16);
        for (idx, (k, v)) in self.query.iter().enumerate() {
            if idx != 0 {
                s.push('&');
            }
            s.push_str(k);
            s.push('=');
            s.push_str(v);
        }
        s
    }

    /// Render the signed header list: `host;x-amz-date`.
    pub fn signed_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Names that take part in the signature, query names first, in canonical order.
    pub fn names(&self) -> Vec<&str> {
        self.query
            .iter()
            .map(|(k, _)| k.as_str())
            .chain(self.headers.iter().map(|(k, _)| k.as_str()))
            .collect()
    }
}
