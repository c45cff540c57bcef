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

use crate::utils::Redact;
use crate::{Context, ProvideCredential, Result};
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

/// Credential that holds the access key id and secret access key.
///
/// A credential is an immutable snapshot: rotation replaces the holder, never
/// the fields of a credential in use.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Access key id for the provider.
    pub access_key_id: String,
    /// Secret access key for the provider.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credential {
    /// Create a credential from an access key id and secret.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// A credential is usable for signing when both the key id and the
    /// secret are present.
    pub fn is_valid(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .finish()
    }
}

/// StaticCredentialProvider always hands out the same credential.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with access key ID and secret access key.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            credential: Credential::new(access_key_id, secret_access_key),
        }
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.credential.session_token = Some(token.to_string());
        self
    }
}

impl From<Credential> for StaticCredentialProvider {
    fn from(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    async fn provide_credential(&self, _: &Context) -> Result<Option<Credential>> {
        Ok(Some(self.credential.clone()))
    }
}

/// RotatingCredentialProvider holds a credential that can be swapped
/// out-of-band while calls are in flight.
///
/// Every `provide_credential` call reads one consistent snapshot. A call that
/// already read its snapshot keeps signing with it after a rotation.
#[derive(Debug, Clone)]
pub struct RotatingCredentialProvider {
    current: Arc<RwLock<Arc<Credential>>>,
}

impl RotatingCredentialProvider {
    /// Create a provider holding the initial credential.
    pub fn new(credential: Credential) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(credential))),
        }
    }

    /// Replace the held credential. Later calls observe the new value.
    pub fn rotate(&self, credential: Credential) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(credential);
        log::debug!("credential rotated");
    }

    /// Take a snapshot of the held credential.
    pub fn snapshot(&self) -> Arc<Credential> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ProvideCredential for RotatingCredentialProvider {
    async fn provide_credential(&self, _: &Context) -> Result<Option<Credential>> {
        Ok(Some(self.snapshot().as_ref().clone()))
    }
}
