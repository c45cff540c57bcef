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

//! Response classification.

use crate::code_table::ErrorCodeTable;
use bytes::Bytes;
use cloudcall_core::{Error, ErrorKind, Result, TransportResponse};
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, StatusCode};
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;

const X_AMZ_REQUEST_ID: &str = "x-amz-request-id";
const X_AMZN_REQUESTID: &str = "x-amzn-requestid";
const X_AMZN_ERRORTYPE: &str = "x-amzn-errortype";

/// A provider error as found in a response body.
#[derive(Debug, Default, PartialEq)]
struct ProviderError {
    code: Option<String>,
    message: Option<String>,
    request_id: Option<String>,
}

/// Union of the XML error shapes:
///
/// - `<Response><Errors><Error>..</Error></Errors><RequestID>..</RequestID></Response>`
/// - `<ErrorResponse><Error>..</Error><RequestId>..</RequestId></ErrorResponse>`
/// - `<Error><Code>..</Code><Message>..</Message><RequestId>..</RequestId></Error>`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct XmlErrorBody {
    code: Option<String>,
    message: Option<String>,
    #[serde(alias = "RequestID")]
    request_id: Option<String>,
    error: Option<XmlErrorDetail>,
    errors: Option<XmlErrors>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct XmlErrors {
    error: Vec<XmlErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct XmlErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl From<XmlErrorBody> for ProviderError {
    fn from(body: XmlErrorBody) -> Self {
        let detail = body
            .errors
            .and_then(|errors| errors.error.into_iter().next())
            .or(body.error);
        let (code, message) = match detail {
            Some(d) => (d.code, d.message),
            None => (body.code, body.message),
        };
        ProviderError {
            code: non_empty(code),
            message: non_empty(message),
            request_id: non_empty(body.request_id),
        }
    }
}

/// Classifier turns a transport response into the raw success response or
/// a structured error.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: Arc<ErrorCodeTable>,
}

impl Classifier {
    /// Create a classifier using the default error-code table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `table` to map provider error codes.
    pub fn with_table(mut self, table: ErrorCodeTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    /// Classify the response of a call to `service`.
    ///
    /// A 2xx response is returned untouched, regardless of body shape.
    pub fn classify(&self, service: &str, resp: TransportResponse) -> Result<TransportResponse> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let header_request_id = header_str(resp.headers(), X_AMZ_REQUEST_ID)
            .or_else(|| header_str(resp.headers(), X_AMZN_REQUESTID));

        if status.is_informational() {
            warn!("{service} answered with informational status {status}");
            return Err(with_request_id(
                Error::malformed_response(format!("unexpected informational status {status}"))
                    .with_status(status)
                    .with_body(resp.into_body()),
                header_request_id,
            ));
        }

        if status.is_redirection() {
            let location = header_str(resp.headers(), LOCATION.as_str()).unwrap_or_default();
            debug!("{service} redirected with {status} to {location:?}");
            return Err(with_request_id(
                Error::new(
                    ErrorKind::ServerFault,
                    format!("unexpected redirect {status} to {location:?}"),
                )
                .with_status(status),
                header_request_id,
            ));
        }

        let (parts, body) = resp.into_parts();
        if body.iter().all(u8::is_ascii_whitespace) {
            let kind = kind_for_status(status);
            debug!("{service} answered {status} with an empty body, classified as {kind}");
            let err = Error::new(kind, format!("{service} answered {status} with an empty body"))
                .with_status(status);
            return Err(with_request_id(err, header_request_id));
        }

        let parsed = match parse_error_body(&parts.headers, &body) {
            Some(parsed) => parsed,
            None => {
                warn!("{service} answered {status} with an unparseable error body");
                return Err(with_request_id(
                    Error::malformed_response(format!(
                        "{service} answered {status} with an error body that cannot be parsed"
                    ))
                    .with_status(status)
                    .with_body(body),
                    header_request_id,
                ));
            }
        };

        let request_id = header_request_id.or(parsed.request_id);
        let code = match parsed.code {
            Some(code) => code,
            None => {
                warn!("{service} answered {status} with an error body carrying no code");
                return Err(with_request_id(
                    Error::malformed_response(format!(
                        "{service} answered {status} without an error code"
                    ))
                    .with_status(status)
                    .with_body(body),
                    request_id,
                ));
            }
        };

        let kind = self
            .table
            .lookup(service, &code)
            .unwrap_or(ErrorKind::Unknown);
        debug!("{service} answered {status} with code {code}, classified as {kind}");

        let message = parsed.message.unwrap_or_else(|| code.clone());
        let mut err = Error::new(kind, message)
            .with_code(code)
            .with_status(status);
        if kind == ErrorKind::Unknown {
            err = err.with_body(body);
        }
        Err(with_request_id(err, request_id))
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::FORBIDDEN => ErrorKind::AuthFailure,
        StatusCode::NOT_FOUND => ErrorKind::ResourceNotFound,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Throttling,
        s if s.is_server_error() => ErrorKind::ServerFault,
        _ => ErrorKind::Unknown,
    }
}

/// Parse the error body. Returns `None` when the body is neither XML nor
/// JSON, or cannot be parsed as such.
fn parse_error_body(headers: &HeaderMap, body: &Bytes) -> Option<ProviderError> {
    let text = std::str::from_utf8(body).ok()?.trim_start();
    let json = header_str(headers, CONTENT_TYPE.as_str())
        .map(|v| v.contains("json"))
        .unwrap_or(false);

    if text.starts_with('{') || (json && !text.starts_with('<')) {
        let mut parsed = parse_json_error(text)?;
        if parsed.code.is_none() {
            parsed.code = header_str(headers, X_AMZN_ERRORTYPE).map(|v| normalize_code(&v));
        }
        Some(parsed)
    } else if text.starts_with('<') {
        let body: XmlErrorBody = quick_xml::de::from_str(text).ok()?;
        Some(body.into())
    } else {
        None
    }
}

fn parse_json_error(text: &str) -> Option<ProviderError> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| object.get(*name).and_then(|v| v.as_str()))
            .map(|v| v.to_string())
    };

    Some(ProviderError {
        code: non_empty(field(&["__type", "code", "Code"]).map(|v| normalize_code(&v))),
        message: non_empty(field(&["message", "Message", "errorMessage"])),
        request_id: non_empty(field(&["RequestId", "requestId"])),
    })
}

/// Strip the namespace and the documentation suffix from a JSON protocol
/// error type such as `com.amazonaws.dynamodb.v20120810#ResourceNotFoundException:http://...`.
fn normalize_code(raw: &str) -> String {
    let code = raw.rsplit_once('#').map(|(_, c)| c).unwrap_or(raw);
    let code = code.split_once(':').map(|(c, _)| c).unwrap_or(code);
    code.trim().to_string()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn with_request_id(err: Error, request_id: Option<String>) -> Error {
    match request_id {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}
