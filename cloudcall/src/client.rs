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

use crate::classify::Classifier;
use crate::config::Config;
use crate::decode::DecodeResponse;
use crate::endpoint::EndpointResolver;
use crate::executor::{Executor, ExecutorOptions};
use crate::retry::RetryPolicy;
use cloudcall_core::time::{self, DateTime};
use cloudcall_core::utils::Redact;
use cloudcall_core::{
    ActionRequest, Context, Credential, Endpoint, Error, ProvideCredential, Result, SignRequest,
    SignedRequest, SigningRequest, SigningScheme, TransportResponse,
};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// The lifecycle of one call.
///
/// States only move forward. A retry never resumes a failed call, it builds
/// a new one with a fresh timestamp and signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallState {
    /// The action request has been accepted and its endpoint resolved.
    Built,
    /// The canonical request has been computed.
    Canonicalized,
    /// The request carries its signature.
    Signed,
    /// The request has been handed to the executor.
    Dispatched,
    /// The response was classified as success.
    Succeeded,
    /// The call failed at any stage.
    Failed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Built => "built",
            CallState::Canonicalized => "canonicalized",
            CallState::Signed => "signed",
            CallState::Dispatched => "dispatched",
            CallState::Succeeded => "succeeded",
            CallState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Bookkeeping of a call's progress through [`CallState`].
#[derive(Debug)]
struct CallTrace {
    id: u64,
    service: String,
    action: String,
    state: CallState,
}

impl CallTrace {
    fn advance(&mut self, next: CallState) {
        debug_assert!(next > self.state, "call state must move forward");
        debug!(
            "call {} {}.{}: {} -> {next}",
            self.id, self.service, self.action, self.state
        );
        self.state = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        if self.state != CallState::Failed {
            debug!(
                "call {} {}.{} failed while {}: {err}",
                self.id, self.service, self.action, self.state
            );
            self.state = CallState::Failed;
        }
        err
    }
}

/// A call that has been canonicalized and signed but not dispatched yet.
#[derive(Debug)]
pub struct PreparedCall {
    trace: CallTrace,
    endpoint: Endpoint,
    names: Vec<String>,
    request: SignedRequest,
}

impl PreparedCall {
    /// Current state, always [`CallState::Signed`] until dispatched.
    pub fn state(&self) -> CallState {
        self.trace.state
    }

    /// Endpoint the call is addressed at.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Query and header names included in the canonical request, in
    /// canonical order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The signed request that will be dispatched.
    pub fn signed_request(&self) -> &SignedRequest {
        &self.request
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: Config,
    context: Option<Context>,
    credential_provider: Option<Arc<dyn ProvideCredential>>,
    signer: Option<Arc<dyn SignRequest>>,
    resolver: Option<EndpointResolver>,
    classifier: Classifier,
    handle: Option<Handle>,
}

impl ClientBuilder {
    /// Use `config`.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use `ctx` for transport and environment access.
    pub fn context(mut self, ctx: Context) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Read a credential snapshot from `provider` for every call.
    pub fn credential_provider(mut self, provider: impl ProvideCredential) -> Self {
        self.credential_provider = Some(Arc::new(provider));
        self
    }

    /// Sign with `signer` instead of the one picked from the configured
    /// signing scheme.
    pub fn signer(mut self, signer: impl SignRequest) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Resolve endpoints with `resolver`.
    pub fn endpoint_resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Classify responses with `classifier`.
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Dispatch calls on the runtime behind `handle`.
    ///
    /// When unset the runtime of the current task is used.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let config = self.config;
        config.validate()?;

        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                Error::config_invalid("a tokio runtime is required to build a client")
                    .with_source(e)
            })?,
        };
        let ctx = match self.context {
            Some(ctx) => ctx,
            None => default_context(&config)?,
        };
        let credential_provider = self
            .credential_provider
            .ok_or_else(|| Error::config_invalid("a credential provider is required"))?;
        let signer: Arc<dyn SignRequest> = match self.signer {
            Some(signer) => signer,
            None => match config.signing_scheme {
                SigningScheme::V2 => Arc::new(cloudcall_aws_v2::RequestSigner::new()),
                SigningScheme::V4 => Arc::new(cloudcall_aws_v4::RequestSigner::new()),
            },
        };
        let mut resolver = self.resolver.unwrap_or_default();
        if let Some(uri) = &config.endpoint_override {
            resolver = resolver.with_override(uri)?;
        }

        let executor = Executor::new(
            handle,
            ctx.clone(),
            ExecutorOptions {
                timeout: config.timeout,
                max_connections_per_host: config.max_connections_per_host,
                fail_fast: config.fail_fast,
            },
        );
        debug!(
            "client built for region {} with signing scheme {}",
            config.region,
            signer.scheme()
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                ctx,
                credential_provider,
                signer,
                resolver,
                classifier: self.classifier,
                executor,
                next_id: AtomicU64::new(1),
            }),
        })
    }
}

#[cfg(feature = "default-context")]
fn default_context(config: &Config) -> Result<Context> {
    crate::default_context(config)
}

#[cfg(not(feature = "default-context"))]
fn default_context(_: &Config) -> Result<Context> {
    Err(Error::config_invalid(
        "a context is required when the default-context feature is disabled",
    ))
}

/// Client composes endpoint resolution, signing, dispatch and
/// classification into one asynchronous call.
///
/// Cloning is cheap; clones share the executor and its connection limits.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    ctx: Context,
    credential_provider: Arc<dyn ProvideCredential>,
    signer: Arc<dyn SignRequest>,
    resolver: EndpointResolver,
    classifier: Classifier,
    executor: Executor,
    next_id: AtomicU64,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("signer", &self.inner.signer)
            .field("executor", &self.inner.executor)
            .finish()
    }
}

impl Client {
    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The executor dispatching this client's calls.
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// Cancel every pending call and reject later ones.
    pub fn shutdown(&self) {
        self.inner.executor.shutdown();
    }

    async fn credential(&self) -> Result<Credential> {
        let cred = self
            .inner
            .credential_provider
            .provide_credential(&self.inner.ctx)
            .await?
            .ok_or_else(|| Error::credential_invalid("no credential available"))?;
        if !cred.is_valid() {
            return Err(Error::credential_invalid(
                "access key id and secret access key must not be empty",
            ));
        }
        Ok(cred)
    }

    /// Resolve, canonicalize and sign `req` without dispatching it.
    ///
    /// The request is signed at its pinned time if it has one, at the
    /// current time otherwise.
    pub async fn prepare(&self, req: &ActionRequest) -> Result<PreparedCall> {
        let mut trace = CallTrace {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            service: req.service().to_string(),
            action: req.action().to_string(),
            state: CallState::Built,
        };
        debug!("call {} {}.{}: built", trace.id, trace.service, trace.action);

        let region = req.region().unwrap_or(self.inner.config.region.as_str());
        let endpoint = self
            .inner
            .resolver
            .resolve(req.service(), region)
            .map_err(|e| trace.fail(e))?;
        let cred = self.credential().await.map_err(|e| trace.fail(e))?;
        let now: DateTime = req.time().unwrap_or_else(time::now);

        let mut signing_req =
            SigningRequest::build(req, &endpoint).map_err(|e| trace.fail(e))?;
        let creq = self
            .inner
            .signer
            .canonicalize(&mut signing_req, &cred, now)
            .map_err(|e| trace.fail(e))?;
        let names = creq.names().into_iter().map(str::to_string).collect();
        trace.advance(CallState::Canonicalized);

        let request = self
            .inner
            .signer
            .sign_canonical(signing_req, &creq, &cred, now)
            .map_err(|e| trace.fail(e))?;
        trace.advance(CallState::Signed);
        debug!(
            "call {} signed with {} for {:?} at {}",
            trace.id,
            request.scheme(),
            Redact::from(&cred.access_key_id),
            time::format_iso8601(now)
        );

        Ok(PreparedCall {
            trace,
            endpoint,
            names,
            request,
        })
    }

    /// Dispatch a prepared call and classify its response.
    pub async fn dispatch(&self, call: PreparedCall) -> Result<TransportResponse> {
        self.dispatch_with_cancel(call, CancellationToken::new())
            .await
    }

    async fn dispatch_with_cancel(
        &self,
        call: PreparedCall,
        cancel: CancellationToken,
    ) -> Result<TransportResponse> {
        let PreparedCall {
            mut trace, request, ..
        } = call;

        trace.advance(CallState::Dispatched);
        let resp = self
            .inner
            .executor
            .submit_with_cancel(request, cancel)
            .await
            .map_err(|e| trace.fail(e))?;

        let resp = self
            .inner
            .classifier
            .classify(&trace.service, resp)
            .map_err(|e| trace.fail(e))?;
        trace.advance(CallState::Succeeded);
        Ok(resp)
    }

    /// Execute `req` once.
    ///
    /// Returns the raw 2xx response or a structured error. Nothing is
    /// retried.
    pub async fn execute(&self, req: &ActionRequest) -> Result<TransportResponse> {
        let call = self.prepare(req).await?;
        self.dispatch(call).await
    }

    /// Execute `req` once, aborting when `cancel` fires.
    ///
    /// A token fired before dispatch means no request is ever sent.
    pub async fn execute_with_cancel(
        &self,
        req: &ActionRequest,
        cancel: CancellationToken,
    ) -> Result<TransportResponse> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("call cancelled before dispatch"));
        }
        let call = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::cancelled("call cancelled before dispatch"));
            }
            call = self.prepare(req) => call?,
        };
        if cancel.is_cancelled() {
            return Err(Error::cancelled("call cancelled before dispatch"));
        }
        self.dispatch_with_cancel(call, cancel).await
    }

    /// Execute `req`, retrying retryable failures under `policy`.
    ///
    /// Every attempt is a new call with a fresh signature. Requests without a
    /// pinned time are also signed at a fresh timestamp.
    pub async fn execute_with_retry(
        &self,
        req: &ActionRequest,
        policy: &RetryPolicy,
    ) -> Result<TransportResponse> {
        let mut attempt = 1;
        loop {
            match self.execute(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) if policy.should_retry(attempt, &err) => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "{}.{} attempt {attempt} failed, retrying in {delay:?}: {err}",
                        req.service(),
                        req.action()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Execute `req` once and decode the success body with `decoder`.
    pub async fn execute_decoded<D: DecodeResponse>(
        &self,
        req: &ActionRequest,
        decoder: &D,
    ) -> Result<D::Output> {
        let resp = self.execute(req).await?;
        decoder.decode(&resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudcall_core::{ErrorKind, StaticCredentialProvider};
    use pretty_assertions::assert_eq;

    fn client(config: Config) -> Result<Client> {
        Client::builder()
            .config(config)
            .context(Context::new())
            .credential_provider(StaticCredentialProvider::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            ))
            .build()
    }

    #[test]
    fn test_call_state_order() {
        assert!(CallState::Built < CallState::Canonicalized);
        assert!(CallState::Canonicalized < CallState::Signed);
        assert!(CallState::Signed < CallState::Dispatched);
        assert!(CallState::Dispatched < CallState::Succeeded);
    }

    #[tokio::test]
    async fn test_prepare_reaches_signed() -> Result<()> {
        let client = client(Config::default())?;
        let req = ActionRequest::new("ec2", "DescribeInstances")
            .with_version("2016-11-15")
            .with_param("InstanceId.1", "i-1234");

        let call = client.prepare(&req).await?;
        assert_eq!(call.state(), CallState::Signed);
        assert_eq!(call.endpoint().host(), "ec2.us-east-1.amazonaws.com");
        assert!(call.names().contains(&"InstanceId.1".to_string()));
        assert_eq!(call.signed_request().scheme(), SigningScheme::V4);
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_signs_like_the_signer() -> Result<()> {
        let now = time::parse_iso8601("20220301T081234Z")?;
        let cred = Credential::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        let req = ActionRequest::new("ec2", "DescribeInstances")
            .with_version("2016-11-15")
            .with_param("InstanceId.1", "i-1234")
            .with_time(now);

        let signers: [(SigningScheme, Box<dyn SignRequest>); 2] = [
            (SigningScheme::V2, Box::new(cloudcall_aws_v2::RequestSigner::new())),
            (SigningScheme::V4, Box::new(cloudcall_aws_v4::RequestSigner::new())),
        ];
        for (scheme, signer) in signers {
            let client = client(Config {
                signing_scheme: scheme,
                ..Config::default()
            })?;
            let call = client.prepare(&req).await?;
            let expected = signer.sign(&req, call.endpoint(), &cred, now)?;

            assert_eq!(call.state(), CallState::Signed);
            assert_eq!(call.signed_request().signature(), expected.signature());
            assert_eq!(
                call.signed_request().request().uri(),
                expected.request().uri()
            );
            assert_eq!(
                call.signed_request().request().headers(),
                expected.request().headers()
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_region_fails_before_signing() -> Result<()> {
        let client = client(Config::default())?;
        let req = ActionRequest::new("ec2", "DescribeInstances").with_region("mars-north-1");

        let err = client
            .prepare(&req)
            .await
            .expect_err("unknown region must fail");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_credential_is_rejected() -> Result<()> {
        let client = Client::builder()
            .context(Context::new())
            .credential_provider(StaticCredentialProvider::new("", ""))
            .build()?;
        let req = ActionRequest::new("s3", "ListBuckets");

        let err = client
            .prepare(&req)
            .await
            .expect_err("empty credential must fail");
        assert_eq!(err.kind(), ErrorKind::CredentialInvalid);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_credential_provider() {
        let err = Client::builder()
            .context(Context::new())
            .build()
            .expect_err("credential provider is required");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[tokio::test]
    async fn test_endpoint_override_from_config() -> Result<()> {
        let config = Config {
            endpoint_override: Some("http://127.0.0.1:4566".to_string()),
            signing_scheme: SigningScheme::V2,
            ..Config::default()
        };
        let client = client(config)?;
        let req = ActionRequest::new("sqs", "ListQueues").with_version("2012-11-05");

        let call = client.prepare(&req).await?;
        assert_eq!(call.endpoint().authority(), "127.0.0.1:4566");
        assert_eq!(call.signed_request().scheme(), SigningScheme::V2);
        Ok(())
    }
}
