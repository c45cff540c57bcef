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

use crate::canonical::CanonicalRequest;
use crate::time::DateTime;
use crate::{ActionRequest, Context, Credential, Endpoint, Error, Result};
use crate::{SignedRequest, SigningRequest};
use std::fmt::{self, Debug};
use std::str::FromStr;

/// SigningScheme names the algorithm used to authenticate a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningScheme {
    /// Signature version 2: a single HMAC over the canonical query string,
    /// carried in the `Signature` query parameter.
    V2,
    /// Signature version 4: HMAC over a derived signing key, carried in the
    /// `Authorization` header.
    #[default]
    V4,
}

impl FromStr for SigningScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" | "query" => Ok(SigningScheme::V2),
            "v4" | "4" | "header" => Ok(SigningScheme::V4),
            _ => Err(Error::config_invalid(format!("unknown signing scheme: {s}"))),
        }
    }
}

impl fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningScheme::V2 => f.write_str("v2"),
            SigningScheme::V4 => f.write_str("v4"),
        }
    }
}

/// ProvideCredential supplies a credential snapshot on demand.
///
/// Clients call it once per call, never once per process, so rotation is
/// picked up by the next call.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + 'static {
    /// Load a credential from the current environment.
    ///
    /// Returns `Ok(None)` when this provider has nothing to offer.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Credential>>;
}

/// SignRequest is implemented by every signing scheme.
///
/// Signing is a pure function of its inputs: the same request, credential,
/// endpoint and time always produce the same signature.
pub trait SignRequest: Debug + Send + Sync + 'static {
    /// The scheme implemented.
    fn scheme(&self) -> SigningScheme;

    /// Add the scheme's own parameters or headers to `req` and compute its
    /// canonical form.
    ///
    /// Fails with `CredentialInvalid` for an empty credential and with
    /// `RequestInvalid` for content that cannot be canonicalized.
    fn canonicalize(
        &self,
        req: &mut SigningRequest,
        cred: &Credential,
        now: DateTime,
    ) -> Result<CanonicalRequest>;

    /// Compute the signature over `creq` and attach it to `req`.
    ///
    /// `creq` must be the result of [`SignRequest::canonicalize`] on the same
    /// `req`, credential and time.
    fn sign_canonical(
        &self,
        req: SigningRequest,
        creq: &CanonicalRequest,
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignedRequest>;

    /// Produce the fully signed request for `req` addressed at `endpoint`.
    fn sign(
        &self,
        req: &ActionRequest,
        endpoint: &Endpoint,
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignedRequest> {
        let mut signing_req = SigningRequest::build(req, endpoint)?;
        let creq = self.canonicalize(&mut signing_req, cred, now)?;
        self.sign_canonical(signing_req, &creq, cred, now)
    }
}
