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

use bytes::Bytes;
use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// The error type for cloudcall operations.
///
/// Every failure a caller can observe is an `Error`: local configuration
/// problems, transport failures, provider-reported errors and malformed
/// responses. The retryable flag is computed once at construction so callers
/// never need to look at the original response again.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    status: Option<StatusCode>,
    request_id: Option<String>,
    body: Option<Bytes>,
    retryable: bool,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration is invalid: unknown region or service, bad endpoint override, bad option value.
    ConfigInvalid,
    /// Credentials are absent or empty. Raised locally before any request is signed.
    CredentialInvalid,
    /// The request cannot be canonicalized (unrepresentable parameter or header).
    RequestInvalid,
    /// The request never produced a response.
    Transport(TransportFailure),
    /// The provider asked us to slow down.
    Throttling,
    /// The provider rejected our credentials or signature.
    AuthFailure,
    /// The provider rejected a parameter.
    InvalidParameter,
    /// The provider could not find the addressed resource.
    ResourceNotFound,
    /// The provider failed internally, or answered with an unexpected redirect.
    ServerFault,
    /// The response violates the expected protocol shape.
    MalformedResponse,
    /// An external decoder rejected a success body.
    DecodeFailed,
    /// A provider error carrying a code we do not recognize.
    Unknown,
}

/// The low-level cause of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailure {
    /// The remote host refused the connection.
    ConnectionRefused,
    /// The connection was reset or closed before the response completed.
    ConnectionReset,
    /// The end-to-end deadline elapsed.
    Timeout,
    /// The host name could not be resolved.
    Dns,
    /// TLS negotiation failed.
    Tls,
    /// The caller cancelled the call.
    Cancelled,
    /// No connection slot was available and the executor runs in fail-fast mode.
    PoolExhausted,
    /// Any other transport problem.
    Other,
}

/// The coarse error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failed before any network access.
    Configuration,
    /// Failed while talking to the remote host.
    Transport,
    /// The provider answered with a structured error.
    Provider,
    /// The provider answered with something we cannot interpret.
    MalformedResponse,
    /// The success body could not be decoded.
    Decode,
}

impl ErrorKind {
    /// Returns the taxonomy category of this kind.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::ConfigInvalid | ErrorKind::CredentialInvalid | ErrorKind::RequestInvalid => {
                ErrorCategory::Configuration
            }
            ErrorKind::Transport(_) => ErrorCategory::Transport,
            ErrorKind::Throttling
            | ErrorKind::AuthFailure
            | ErrorKind::InvalidParameter
            | ErrorKind::ResourceNotFound
            | ErrorKind::ServerFault
            | ErrorKind::Unknown => ErrorCategory::Provider,
            ErrorKind::MalformedResponse => ErrorCategory::MalformedResponse,
            ErrorKind::DecodeFailed => ErrorCategory::Decode,
        }
    }

    fn is_retryable(&self, status: Option<StatusCode>) -> bool {
        let server_side = status.map(|s| s.is_server_error());
        match self {
            ErrorKind::Throttling => true,
            ErrorKind::ServerFault => server_side.unwrap_or(true),
            ErrorKind::Transport(cause) => *cause != TransportFailure::Cancelled,
            ErrorKind::Unknown => server_side.unwrap_or(false),
            _ => false,
        }
    }
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status: None,
            request_id: None,
            body: None,
            retryable: kind.is_retryable(None),
            source: None,
        }
    }

    /// Add a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the provider-defined error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the HTTP status, recomputing the retryable flag.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self.retryable = self.kind.is_retryable(self.status);
        self
    }

    /// Attach the provider request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Preserve the raw response body for diagnostics.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the taxonomy category.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Provider-defined error code, if the provider sent one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// HTTP status of the response this error was decoded from.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Provider request id, useful when reporting issues upstream.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Raw response body, kept for Unknown and MalformedResponse errors.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether issuing the same call again (re-signed) may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Check if this error was reported by the provider.
    pub fn is_provider_error(&self) -> bool {
        self.category() == ErrorCategory::Provider
    }

    /// Check if the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Transport(TransportFailure::Cancelled)
    }

    /// Check if the call ran out of time.
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Transport(TransportFailure::Timeout)
    }
}

// Convenience constructors
impl Error {
    /// Create a config invalid error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a credential invalid error.
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Create a request invalid error.
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a transport error with the given cause.
    pub fn transport(cause: TransportFailure, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport(cause), message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transport(TransportFailure::Timeout, message)
    }

    /// Create a cancelled error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::transport(TransportFailure::Cancelled, message)
    }

    /// Create a malformed response error.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    /// Create a decode failed error.
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeFailed, message)
    }

    /// Create an unexpected transport error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::transport(TransportFailure::Other, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::CredentialInvalid => write!(f, "invalid credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::Transport(cause) => write!(f, "transport failure: {cause}"),
            ErrorKind::Throttling => write!(f, "throttled"),
            ErrorKind::AuthFailure => write!(f, "authentication failure"),
            ErrorKind::InvalidParameter => write!(f, "invalid parameter"),
            ErrorKind::ResourceNotFound => write!(f, "resource not found"),
            ErrorKind::ServerFault => write!(f, "server fault"),
            ErrorKind::MalformedResponse => write!(f, "malformed response"),
            ErrorKind::DecodeFailed => write!(f, "decode failed"),
            ErrorKind::Unknown => write!(f, "unknown provider error"),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::ConnectionRefused => write!(f, "connection refused"),
            TransportFailure::ConnectionReset => write!(f, "connection reset"),
            TransportFailure::Timeout => write!(f, "timed out"),
            TransportFailure::Dns => write!(f, "dns resolution failed"),
            TransportFailure::Tls => write!(f, "tls negotiation failed"),
            TransportFailure::Cancelled => write!(f, "cancelled"),
            TransportFailure::PoolExhausted => write!(f, "connection limit reached"),
            TransportFailure::Other => write!(f, "other"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::config_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
