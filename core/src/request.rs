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

use crate::canonical::{canonicalize_query, encode_path};
use crate::time::DateTime;
use crate::{Endpoint, Error, Result, SigningScheme};
use bytes::Bytes;
use http::header::HOST;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use std::fmt;
use std::str::FromStr;

/// ActionRequest describes one logical API call.
///
/// It is built once per call by the action catalog and is never mutated after
/// it is handed to a client. Retries sign a fresh copy.
///
/// When an API version is set the call uses the query protocol: the action
/// name and version travel as the `Action` and `Version` parameters. Without
/// a version the action is only a label for logging (REST style services).
///
/// ```
/// use cloudcall_core::ActionRequest;
///
/// let req = ActionRequest::new("ec2", "DescribeInstances")
///     .with_version("2016-11-15")
///     .with_param("InstanceId.1", "i-1234567890abcdef0");
/// assert_eq!(req.query_params()[0], ("Action".to_string(), "DescribeInstances".to_string()));
/// ```
#[derive(Debug, Clone)]
pub struct ActionRequest {
    service: String,
    action: String,
    api_version: Option<String>,
    params: Vec<(String, String)>,
    region: Option<String>,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    time: Option<DateTime>,
    unsigned_payload: bool,
}

impl ActionRequest {
    /// Create a GET request for `action` on `service`, addressed at `/`.
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            api_version: None,
            params: Vec::new(),
            region: None,
            method: Method::GET,
            path: "/".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            time: None,
            unsigned_payload: false,
        }
    }

    /// Set the API version, switching the call to the query protocol.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Append one parameter. Order of insertion does not affect signing.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Append many parameters.
    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Target a region other than the client's configured one.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the request path relative to the endpoint.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add an extra header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Pin the signing time instead of reading the clock.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Leave the payload out of the signature where the scheme allows it.
    pub fn with_unsigned_payload(mut self, unsigned: bool) -> Self {
        self.unsigned_payload = unsigned;
        self
    }

    /// Service identifier such as `ec2` or `s3`.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// API version, if this is a query protocol call.
    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// Caller supplied parameters, without the injected `Action`/`Version`.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Region override.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Extra headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Pinned signing time.
    pub fn time(&self) -> Option<DateTime> {
        self.time
    }

    /// Whether the payload is excluded from the signature.
    pub fn unsigned_payload(&self) -> bool {
        self.unsigned_payload
    }

    /// Every parameter that travels with the request, `Action` and `Version`
    /// first when the query protocol is in use.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.params.len() + 2);
        if let Some(version) = &self.api_version {
            out.push(("Action".to_string(), self.action.clone()));
            out.push(("Version".to_string(), version.clone()));
        }
        out.extend(self.params.iter().cloned());
        out
    }
}

/// SigningRequest is the mutable scratch form a signing scheme works on.
///
/// It is built from an [`ActionRequest`] and the resolved [`Endpoint`]. The
/// scheme adds its own parameters or headers, canonicalizes, attaches the
/// signature and finally turns it into a concrete `http::Request`.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// Raw, not yet encoded, request path.
    pub path: String,
    /// Raw, not yet encoded, query parameters.
    pub query: Vec<(String, String)>,
    /// HTTP headers, `Host` included.
    pub headers: HeaderMap,
    /// HTTP body.
    pub body: Bytes,
    /// Service the request is addressed to.
    pub service: String,
    /// Region the request is signed for.
    pub region: String,
    /// Whether the payload is excluded from the signature.
    pub unsigned_payload: bool,
}

impl SigningRequest {
    /// Build a signing request for `req` addressed at `endpoint`.
    pub fn build(req: &ActionRequest, endpoint: &Endpoint) -> Result<Self> {
        let authority = Authority::from_str(&endpoint.authority())?;

        let mut headers = req.headers().clone();
        headers.insert(HOST, HeaderValue::from_str(authority.as_str())?);

        Ok(SigningRequest {
            method: req.method().clone(),
            scheme: endpoint.scheme().clone(),
            authority,
            path: endpoint.join(req.path()),
            query: req.query_params(),
            headers,
            body: req.body().clone(),
            service: req.service().to_string(),
            region: endpoint.signing_region().to_string(),
            unsigned_payload: req.unsigned_payload(),
        })
    }

    /// The value of the `Host` header.
    pub fn host(&self) -> &str {
        self.authority.as_str()
    }

    /// Push a new query pair into query list.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Move every query pair into an `application/x-www-form-urlencoded` body.
    pub fn query_into_form_body(&mut self) {
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.query.drain(..) {
            form.append_pair(&k, &v);
        }
        self.body = Bytes::from(form.finish());
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
    }

    /// Turn the signing request into the request that is sent on the wire.
    ///
    /// The path and query are encoded with the same rules used for the
    /// canonical request so the remote verifier sees identical bytes.
    pub fn apply(self) -> Result<http::Request<Bytes>> {
        let query = canonicalize_query(&self.query)?;

        let mut paq = encode_path(&self.path);
        if !query.is_empty() {
            paq.push('?');
            for (idx, (k, v)) in query.iter().enumerate() {
                if idx > 0 {
                    paq.push('&');
                }
                paq.push_str(k);
                paq.push('=');
                paq.push_str(v);
            }
        }

        let uri = Uri::builder()
            .scheme(self.scheme)
            .authority(self.authority)
            .path_and_query(PathAndQuery::from_str(&paq)?)
            .build()?;

        let mut req = http::Request::new(self.body);
        *req.method_mut() = self.method;
        *req.uri_mut() = uri;
        *req.headers_mut() = self.headers;
        Ok(req)
    }
}

/// SignedRequest is a request that carries a complete signature.
///
/// This is the only request type the executor accepts. It is produced by a
/// [`SignRequest`](crate::SignRequest) implementation.
pub struct SignedRequest {
    request: http::Request<Bytes>,
    scheme: SigningScheme,
    signature: String,
    signed_at: DateTime,
}

impl SignedRequest {
    /// Wrap a request whose signature has been attached.
    pub fn new(
        request: http::Request<Bytes>,
        scheme: SigningScheme,
        signature: String,
        signed_at: DateTime,
    ) -> Result<Self> {
        if signature.is_empty() {
            return Err(Error::credential_invalid("signed request without signature"));
        }
        Ok(Self {
            request,
            scheme,
            signature,
            signed_at,
        })
    }

    /// The request as it will be sent.
    pub fn request(&self) -> &http::Request<Bytes> {
        &self.request
    }

    /// Signature string (hex for v4, base64 for v2).
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Scheme that produced the signature.
    pub fn scheme(&self) -> SigningScheme {
        self.scheme
    }

    /// Time the signature is bound to.
    pub fn signed_at(&self) -> DateTime {
        self.signed_at
    }

    /// Take the underlying request out.
    pub fn into_request(self) -> http::Request<Bytes> {
        self.request
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("headers", self.request.headers())
            .field("body_len", &self.request.body().len())
            .field("scheme", &self.scheme)
            .field("signed_at", &self.signed_at)
            .finish()
    }
}
