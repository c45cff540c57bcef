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

//! Table-driven mapping of provider error codes to [`ErrorKind`].

use cloudcall_core::ErrorKind;
use std::collections::HashMap;

const AUTH_FAILURE_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "AuthorizationHeaderMalformed",
    "ExpiredToken",
    "ExpiredTokenException",
    "IncompleteSignature",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "InvalidSecurity",
    "InvalidToken",
    "MissingAuthenticationToken",
    "NotAuthorized",
    "OptInRequired",
    "RequestExpired",
    "SignatureDoesNotMatch",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottled",
    "RequestThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "SlowDown",
    "PriorRequestNotComplete",
    "BandwidthLimitExceeded",
];

const INVALID_PARAMETER_CODES: &[&str] = &[
    "InvalidParameter",
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "InvalidParameterException",
    "InvalidQueryParameter",
    "InvalidArgument",
    "InvalidAction",
    "InvalidInput",
    "InvalidRequest",
    "MalformedInput",
    "MalformedQueryString",
    "MalformedXML",
    "MissingAction",
    "MissingParameter",
    "UnknownParameter",
    "ValidationError",
    "ValidationException",
    "SerializationException",
];

const NOT_FOUND_CODES: &[&str] = &["NotFound", "ResourceNotFoundException", "NoSuchEntity"];

const SERVER_FAULT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "Unavailable",
];

/// ErrorCodeTable maps provider error codes to error kinds.
///
/// Lookup order is: per-service code, global exact code, prefix rules,
/// suffix rules. Rules added later take precedence over defaults with the
/// same key. Unmatched codes yield `None` and the classifier reports them as
/// `Unknown`.
#[derive(Debug, Clone)]
pub struct ErrorCodeTable {
    codes: HashMap<String, ErrorKind>,
    service_codes: HashMap<(String, String), ErrorKind>,
    prefixes: Vec<(String, ErrorKind)>,
    suffixes: Vec<(String, ErrorKind)>,
}

impl Default for ErrorCodeTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (codes, kind) in [
            (AUTH_FAILURE_CODES, ErrorKind::AuthFailure),
            (THROTTLING_CODES, ErrorKind::Throttling),
            (INVALID_PARAMETER_CODES, ErrorKind::InvalidParameter),
            (NOT_FOUND_CODES, ErrorKind::ResourceNotFound),
            (SERVER_FAULT_CODES, ErrorKind::ServerFault),
        ] {
            for code in codes {
                table.codes.insert(code.to_string(), kind);
            }
        }

        table
            .with_prefix("NoSuch", ErrorKind::ResourceNotFound)
            .with_suffix(".NotFound", ErrorKind::ResourceNotFound)
            .with_suffix(".Malformed", ErrorKind::InvalidParameter)
            .with_suffix("NotFoundException", ErrorKind::ResourceNotFound)
            .with_service_code("sqs", "AWS.SimpleQueueService.NonExistentQueue", ErrorKind::ResourceNotFound)
            .with_service_code("sqs", "QueueDoesNotExist", ErrorKind::ResourceNotFound)
            .with_service_code("sqs", "AWS.SimpleQueueService.QueueDeletedRecently", ErrorKind::Throttling)
            .with_service_code("route53", "NoSuchHostedZone", ErrorKind::ResourceNotFound)
            .with_service_code("route53", "InvalidChangeBatch", ErrorKind::InvalidParameter)
            .with_service_code("s3", "InvalidBucketName", ErrorKind::InvalidParameter)
            .with_service_code("s3", "EntityTooLarge", ErrorKind::InvalidParameter)
            .with_service_code("ec2", "InvalidInstanceID", ErrorKind::ResourceNotFound)
    }
}

impl ErrorCodeTable {
    /// A table with no rules.
    pub fn empty() -> Self {
        Self {
            codes: HashMap::new(),
            service_codes: HashMap::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    /// Map `code` to `kind` for every service.
    pub fn with_code(mut self, code: impl Into<String>, kind: ErrorKind) -> Self {
        self.codes.insert(code.into(), kind);
        self
    }

    /// Map `code` to `kind` for `service` only.
    pub fn with_service_code(
        mut self,
        service: impl Into<String>,
        code: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        self.service_codes.insert((service.into(), code.into()), kind);
        self
    }

    /// Map every code starting with `prefix` to `kind`.
    pub fn with_prefix(mut self, prefix: impl Into<String>, kind: ErrorKind) -> Self {
        self.prefixes.insert(0, (prefix.into(), kind));
        self
    }

    /// Map every code ending with `suffix` to `kind`.
    pub fn with_suffix(mut self, suffix: impl Into<String>, kind: ErrorKind) -> Self {
        self.suffixes.insert(0, (suffix.into(), kind));
        self
    }

    /// Find the kind for `code` reported by `service`.
    pub fn lookup(&self, service: &str, code: &str) -> Option<ErrorKind> {
        if let Some(kind) = self
            .service_codes
            .get(&(service.to_string(), code.to_string()))
        {
            return Some(*kind);
        }
        if let Some(kind) = self.codes.get(code) {
            return Some(*kind);
        }
        if let Some((_, kind)) = self.prefixes.iter().find(|(p, _)| code.starts_with(p.as_str())) {
            return Some(*kind);
        }
        self.suffixes
            .iter()
            .find(|(s, _)| code.ends_with(s.as_str()))
            .map(|(_, kind)| *kind)
    }
}
