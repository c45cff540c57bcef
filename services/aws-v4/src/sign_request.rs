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
use cloudcall_core::canonical::{canonicalize_headers, canonicalize_query, encode_path};
use cloudcall_core::canonical::CanonicalRequest;
use cloudcall_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use cloudcall_core::time::{format_date, format_iso8601, DateTime};
use cloudcall_core::utils::Redact;
use cloudcall_core::{
    Credential, Error, Result, SignRequest, SignedRequest, SigningRequest, SigningScheme,
};
use http::header::{self, HeaderName, HeaderValue};
use log::debug;
use std::fmt::Write;

/// RequestSigner that implement AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
///
/// The signer is stateless: service and region come from the request and
/// the resolved endpoint, so one signer serves every call of a client.
#[derive(Debug, Default, Clone)]
pub struct RequestSigner {}

impl RequestSigner {
    /// Create a new signer.
    pub fn new() -> Self {
        Self {}
    }
}

impl SignRequest for RequestSigner {
    fn scheme(&self) -> SigningScheme {
        SigningScheme::V4
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

        let payload_hash = if req.unsigned_payload {
            UNSIGNED_PAYLOAD.to_string()
        } else {
            hex_sha256(&req.body)
        };

        req.headers.remove(header::AUTHORIZATION);
        req.headers
            .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);
        if PAYLOAD_HEADER_SERVICES.contains(&req.service.as_str()) {
            req.headers
                .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::from_str(&payload_hash)?);
        }
        match &cred.session_token {
            Some(token) => {
                let mut value = HeaderValue::from_str(token)?;
                // Set token value sensitive to valid leaking.
                value.set_sensitive(true);
                req.headers.insert(X_AMZ_SECURITY_TOKEN, value);
            }
            None => {
                req.headers.remove(X_AMZ_SECURITY_TOKEN);
            }
        }

        Ok(CanonicalRequest {
            method: req.method.clone(),
            host: req.host().to_string(),
            path: encode_path(&req.path),
            query: canonicalize_query(&req.query)?,
            headers: canonicalize_headers(&req.headers, is_signed_header)?,
            payload_hash: Some(payload_hash),
        })
    }

    fn sign_canonical(
        &self,
        mut signing_req: SigningRequest,
        creq: &CanonicalRequest,
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignedRequest> {

        let encoded_req = hex_sha256(canonical_request_string(creq)?.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/{TERMINATOR}",
            format_date(now),
            signing_req.region,
            signing_req.service
        );
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{ALGORITHM}")?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", &encoded_req)?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key = generate_signing_key(
            &cred.secret_access_key,
            now,
            &signing_req.region,
            &signing_req.service,
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            scope,
            creq.signed_headers(),
            signature
        ))?;
        authorization.set_sensitive(true);
        signing_req
            .headers
            .insert(header::AUTHORIZATION, authorization);
        debug!(
            "signed {} {} for {:?}",
            creq.method,
            creq.path,
            Redact::from(&cred.access_key_id)
        );

        SignedRequest::new(signing_req.apply()?, SigningScheme::V4, signature, now)
    }
}

fn is_signed_header(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONTENT_TYPE
        || name.as_str() == "content-md5"
        || name.as_str().starts_with("x-amz-")
}

fn canonical_request_string(creq: &CanonicalRequest) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", creq.method)?;
    // Insert encoded path
    writeln!(f, "{}", creq.path)?;
    // Insert query
    writeln!(f, "{}", creq.query_string())?;
    // Insert signed headers
    for (k, v) in creq.headers.iter() {
        writeln!(f, "{k}:{v}")?;
    }
    writeln!(f)?;
    writeln!(f, "{}", creq.signed_headers())?;
    write!(
        f,
        "{}",
        creq.payload_hash.as_deref().unwrap_or(UNSIGNED_PAYLOAD)
    )?;

    Ok(f)
}

fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes());
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    // Sign request
    hmac_sha256(sign_service.as_slice(), TERMINATOR.as_bytes())
}
