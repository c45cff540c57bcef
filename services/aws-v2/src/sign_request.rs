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

use crate::constants::*;
use cloudcall_core::canonical::{canonicalize_query, encode_path, CanonicalRequest};
use cloudcall_core::hash::{base64_hmac_sha1, base64_hmac_sha256};
use cloudcall_core::time::{format_iso8601_with_separator, DateTime};
use cloudcall_core::utils::Redact;
use cloudcall_core::{
    Credential, Error, Result, SignRequest, SignedRequest, SigningRequest, SigningScheme,
};
use http::Method;
use log::debug;
use std::fmt;

/// SignatureMethod selects the HMAC used by signature version 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMethod {
    /// `HmacSHA256`
    #[default]
    HmacSha256,
    /// `HmacSHA1`, kept for services that predate SHA-256.
    HmacSha1,
}

impl SignatureMethod {
    fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::HmacSha256 => "HmacSHA256",
            SignatureMethod::HmacSha1 => "HmacSHA1",
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RequestSigner that implements signature version 2.
///
/// - [Signature Version 2 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-2.html)
///
/// For `POST` requests the signed parameters are sent as a form body instead
/// of the URI query.
#[derive(Debug, Default, Clone)]
pub struct RequestSigner {
    method: SignatureMethod,
}

impl RequestSigner {
    /// Create a signer using `HmacSHA256`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the signature method.
    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.method = method;
        self
    }
}

impl SignRequest for RequestSigner {
    fn scheme(&self) -> SigningScheme {
        SigningScheme::V2
    }

    fn canonicalize(
        &self,
        req: &mut SigningRequest,
        cred: &Credential,
        now: DateTime,
    ) -> Result<CanonicalRequest> {
        if !cred.is_valid() {
            return Err(Error::credential_invalid(
                "access key id and secret access key are required for signing",
            ));
        }

        req.query.retain(|(k, _)| {
            !matches!(
                k.as_str(),
                SIGNATURE
                    | AWS_ACCESS_KEY_ID
                    | SIGNATURE_METHOD
                    | SIGNATURE_VERSION
                    | SECURITY_TOKEN
                    | TIMESTAMP
            )
        });
        req.query_push(AWS_ACCESS_KEY_ID, cred.access_key_id.as_str());
        req.query_push(SIGNATURE_VERSION, SIGNATURE_VERSION_VALUE);
        req.query_push(SIGNATURE_METHOD, self.method.as_str());
        req.query_push(TIMESTAMP, format_iso8601_with_separator(now));
        if let Some(token) = &cred.session_token {
            req.query_push(SECURITY_TOKEN, token.as_str());
        }

        Ok(CanonicalRequest {
            method: req.method.clone(),
            host: req.host().to_lowercase(),
            path: encode_path(&req.path),
            query: canonicalize_query(&req.query)?,
            headers: Vec::new(),
            payload_hash: None,
        })
    }

    fn sign_canonical(
        &self,
        mut signing_req: SigningRequest,
        creq: &CanonicalRequest,
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignedRequest> {

        let string_to_sign = string_to_sign(creq);
        debug!(
            "signing {} {}{} for {:?} with {}, names: {:?}",
            creq.method,
            creq.host,
            creq.path,
            Redact::from(&cred.access_key_id),
            self.method,
            creq.names()
        );

        let key = cred.secret_access_key.as_bytes();
        let signature = match self.method {
            SignatureMethod::HmacSha256 => base64_hmac_sha256(key, string_to_sign.as_bytes()),
            SignatureMethod::HmacSha1 => base64_hmac_sha1(key, string_to_sign.as_bytes()),
        };

        signing_req.query_push(SIGNATURE, signature.as_str());
        if signing_req.method == Method::POST {
            signing_req.query_into_form_body();
        }

        SignedRequest::new(signing_req.apply()?, SigningScheme::V2, signature, now)
    }
}

/// StringToSign:
///
/// ```text
/// GET
/// ec2.us-east-1.amazonaws.com
/// /
/// AWSAccessKeyId=...&Action=...
/// ```
fn string_to_sign(creq: &CanonicalRequest) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        creq.method,
        creq.host,
        creq.path,
        creq.query_string()
    )
}
