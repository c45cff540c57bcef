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
use cloudcall::time::parse_rfc3339;
use cloudcall::{
    ActionRequest, CancellationToken, Client, Config, Context, Credential, Endpoint, ErrorKind,
    HttpSend, Result, RetryPolicy, RotatingCredentialProvider, SignRequest, SigningScheme,
    StaticCredentialProvider, TransportFailure, XmlDecoder,
};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

const ACCESS_KEY_ID: &str = "AKIDEXAMPLE";
const SECRET_ACCESS_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the fake transport saw.
#[derive(Debug, Clone)]
struct Recorded {
    method: http::Method,
    uri: String,
    headers: http::HeaderMap,
    body: Bytes,
}

type Respond = dyn Fn(usize, &Recorded) -> (u16, String) + Send + Sync;

/// HttpSend that never touches the network.
#[derive(Clone)]
struct FakeHttpSend {
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    delay: Option<Duration>,
    hang: bool,
    respond: Arc<Respond>,
}

impl fmt::Debug for FakeHttpSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeHttpSend")
            .field("calls", &self.calls())
            .finish()
    }
}

impl FakeHttpSend {
    fn respond(f: impl Fn(usize, &Recorded) -> (u16, String) + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::default(),
            active: Arc::default(),
            max_active: Arc::default(),
            requests: Arc::default(),
            delay: None,
            hang: false,
            respond: Arc::new(f),
        }
    }

    fn status(status: u16, body: &'static str) -> Self {
        Self::respond(move |_, _| (status, body.to_string()))
    }

    fn hanging() -> Self {
        let mut fake = Self::status(200, "");
        fake.hang = true;
        fake
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl HttpSend for FakeHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(self.active.clone());

        let (parts, body) = req.into_parts();
        let recorded = Recorded {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        };
        self.requests.lock().unwrap().push(recorded.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }

        let (status, body) = (self.respond)(n, &recorded);
        Ok(http::Response::builder()
            .status(status)
            .body(Bytes::from(body))?)
    }
}

fn client_with(fake: &FakeHttpSend, config: Config) -> Result<Client> {
    Client::builder()
        .config(config)
        .context(Context::new().with_http_send(fake.clone()))
        .credential_provider(StaticCredentialProvider::new(
            ACCESS_KEY_ID,
            SECRET_ACCESS_KEY,
        ))
        .runtime(Handle::current())
        .build()
}

fn client(fake: &FakeHttpSend) -> Result<Client> {
    client_with(fake, Config::default())
}

fn describe_instances() -> ActionRequest {
    ActionRequest::new("ec2", "DescribeInstances").with_version("2016-11-15")
}

async fn wait_for_calls(fake: &FakeHttpSend, n: usize) {
    while fake.calls() < n {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_success_body_round_trip() -> anyhow::Result<()> {
    init();

    let body = "<DescribeInstancesResponse><reservationSet/></DescribeInstancesResponse>";
    let fake = FakeHttpSend::status(200, body);
    let resp = client(&fake)?.execute(&describe_instances()).await?;

    assert_eq!(resp.status(), http::StatusCode::OK);
    assert_eq!(resp.body(), &Bytes::from_static(body.as_bytes()));
    assert_eq!(fake.calls(), 1);

    let sent = &fake.requests()[0];
    assert_eq!(sent.method, http::Method::GET);
    assert!(sent
        .uri
        .starts_with("https://ec2.us-east-1.amazonaws.com/?Action=DescribeInstances&Version=2016-11-15"));
    assert!(sent.headers.contains_key(http::header::AUTHORIZATION));
    Ok(())
}

#[tokio::test]
async fn test_access_denied_is_auth_failure() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(
        403,
        "<Error><Code>AccessDenied</Code><Message>Access Denied</Message><RequestId>4442587FB7D0A2F9</RequestId></Error>",
    );
    let err = client(&fake)?
        .execute(&ActionRequest::new("s3", "GetObject").with_path("/bucket/key"))
        .await
        .expect_err("403 must fail");

    assert_eq!(err.kind(), ErrorKind::AuthFailure);
    assert_eq!(err.code(), Some("AccessDenied"));
    assert_eq!(err.request_id(), Some("4442587FB7D0A2F9"));
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_service_unavailable_is_retryable_server_fault() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(
        503,
        "<Response><Errors><Error><Code>Unavailable</Code><Message>The server is overloaded</Message></Error></Errors><RequestID>r-1</RequestID></Response>",
    );
    let err = client(&fake)?
        .execute(&describe_instances())
        .await
        .expect_err("503 must fail");

    assert_eq!(err.kind(), ErrorKind::ServerFault);
    assert_eq!(err.status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
    assert!(err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_truncated_error_body_is_malformed() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(400, "<Response><Errors><Error><Code>InvalidPar");
    let err = client(&fake)?
        .execute(&describe_instances())
        .await
        .expect_err("400 must fail");

    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(err.body().is_some());
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_cancel_before_dispatch_sends_nothing() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(200, "");
    let token = CancellationToken::new();
    token.cancel();

    let err = client(&fake)?
        .execute_with_cancel(&describe_instances(), token)
        .await
        .expect_err("cancelled call must fail");

    assert!(err.is_cancelled());
    assert!(!err.is_retryable());
    assert_eq!(fake.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_after_dispatch_releases_transport() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::hanging();
    let client = client(&fake)?;
    let token = CancellationToken::new();

    let call = {
        let client = client.clone();
        let token = token.clone();
        tokio::spawn(async move {
            client
                .execute_with_cancel(&describe_instances(), token)
                .await
        })
    };
    wait_for_calls(&fake, 1).await;
    token.cancel();

    let err = call.await?.expect_err("cancelled call must fail");
    assert!(err.is_cancelled());
    assert_eq!(fake.calls(), 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        while fake.active() > 0 || client.executor().in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_timeout_completes_once() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::hanging();
    let config = Config {
        timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let client = client_with(&fake, config)?;

    let err = tokio::time::timeout(Duration::from_secs(5), client.execute(&describe_instances()))
        .await?
        .expect_err("hanging transport must time out");

    assert!(err.is_timeout());
    assert_eq!(
        err.kind(),
        ErrorKind::Transport(TransportFailure::Timeout)
    );
    assert!(err.is_retryable());
    assert_eq!(fake.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_have_independent_signatures() -> anyhow::Result<()> {
    init();

    const N: usize = 32;
    let fake = FakeHttpSend::respond(|_, req| (200, req.uri.clone()));
    let client = client(&fake)?;
    let now = parse_rfc3339("2015-08-30T12:36:00Z")?;

    let requests: Vec<ActionRequest> = (0..N)
        .map(|i| {
            describe_instances()
                .with_param("InstanceId.1", format!("i-{i:08}"))
                .with_time(now)
        })
        .collect();
    let results = join_all(requests.iter().map(|req| {
        let client = client.clone();
        async move { client.execute(req).await }
    }))
    .await;

    let signer = cloudcall::aws::v4::RequestSigner::new();
    let endpoint = Endpoint::https("ec2.us-east-1.amazonaws.com", "us-east-1");
    let cred = Credential::new(ACCESS_KEY_ID, SECRET_ACCESS_KEY);

    let mut seen = HashSet::new();
    for (req, res) in requests.iter().zip(results) {
        let resp = res?;
        let expected = signer.sign(req, &endpoint, &cred, now)?;

        // The fake echoes the URI back, so every response must belong to its request.
        assert_eq!(
            resp.body(),
            &Bytes::from(expected.request().uri().to_string())
        );
        assert!(seen.insert(expected.signature().to_string()));
    }
    assert_eq!(seen.len(), N);

    let sent: HashSet<String> = fake
        .requests()
        .iter()
        .map(|r| {
            r.headers[http::header::AUTHORIZATION]
                .to_str()
                .unwrap()
                .rsplit("Signature=")
                .next()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(sent, seen);
    Ok(())
}

#[tokio::test]
async fn test_connections_per_host_are_bounded() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(200, "ok").with_delay(Duration::from_millis(50));
    let config = Config {
        max_connections_per_host: 2,
        ..Config::default()
    };
    let client = client_with(&fake, config)?;

    let req = describe_instances();
    let results = join_all((0..8).map(|_| client.execute(&req))).await;

    for res in results {
        assert_eq!(res?.body(), &Bytes::from_static(b"ok"));
    }
    assert_eq!(fake.calls(), 8);
    assert!(fake.max_active() <= 2, "max active was {}", fake.max_active());
    Ok(())
}

#[tokio::test]
async fn test_fail_fast_reports_pool_exhausted() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::hanging();
    let config = Config {
        max_connections_per_host: 1,
        fail_fast: true,
        ..Config::default()
    };
    let client = client_with(&fake, config)?;

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(&describe_instances()).await })
    };
    wait_for_calls(&fake, 1).await;

    let err = client
        .execute(&describe_instances())
        .await
        .expect_err("second call must not get a connection");
    assert_eq!(
        err.kind(),
        ErrorKind::Transport(TransportFailure::PoolExhausted)
    );
    assert_eq!(fake.calls(), 1);

    first.abort();
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_pending_and_rejects_new_calls() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::hanging();
    let client = client(&fake)?;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(&describe_instances()).await })
    };
    wait_for_calls(&fake, 1).await;

    client.shutdown();
    assert!(client.executor().is_shutdown());

    let err = pending.await?.expect_err("pending call must be cancelled");
    assert!(err.is_cancelled());

    let err = client
        .execute(&describe_instances())
        .await
        .expect_err("calls after shutdown must be rejected");
    assert!(err.is_cancelled());
    assert_eq!(fake.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_issues_new_calls() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::respond(|n, _| match n {
        0 => (503, "<Error><Code>SlowDown</Code></Error>".to_string()),
        1 => (500, "<Error><Code>InternalError</Code></Error>".to_string()),
        _ => (200, "done".to_string()),
    });
    let client = client(&fake)?;
    let policy = RetryPolicy::new(3)?.with_base_delay(Duration::from_millis(1));

    let resp = client
        .execute_with_retry(&ActionRequest::new("s3", "ListBuckets"), &policy)
        .await?;

    assert_eq!(resp.body(), &Bytes::from_static(b"done"));
    assert_eq!(fake.calls(), 3);
    for req in fake.requests() {
        assert!(req.headers.contains_key("x-amz-date"));
        assert!(req.headers.contains_key(http::header::AUTHORIZATION));
    }
    Ok(())
}

#[tokio::test]
async fn test_retry_aborts_on_non_retryable() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(
        400,
        "<ErrorResponse><Error><Code>InvalidParameterValue</Code><Message>bad</Message></Error></ErrorResponse>",
    );
    let client = client(&fake)?;
    let policy = RetryPolicy::new(5)?.with_base_delay(Duration::from_millis(1));

    let err = client
        .execute_with_retry(&describe_instances(), &policy)
        .await
        .expect_err("invalid parameter must fail");

    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert_eq!(fake.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_query_scheme_post_through_client() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(200, "");
    let config = Config {
        signing_scheme: SigningScheme::V2,
        ..Config::default()
    };
    let client = client_with(&fake, config)?;

    let req = ActionRequest::new("sqs", "SendMessage")
        .with_version("2012-11-05")
        .with_method(http::Method::POST)
        .with_path("/123456789012/queue")
        .with_param("MessageBody", "hello world");
    client.execute(&req).await?;

    let sent = &fake.requests()[0];
    assert_eq!(sent.uri, "https://sqs.us-east-1.amazonaws.com/123456789012/queue");
    assert!(!sent.headers.contains_key(http::header::AUTHORIZATION));

    let form: Vec<(String, String)> = form_urlencoded::parse(&sent.body)
        .into_owned()
        .collect();
    let names: Vec<&str> = form.iter().map(|(k, _)| k.as_str()).collect();
    for name in ["Action", "Version", "MessageBody", "AWSAccessKeyId", "Signature"] {
        assert!(names.contains(&name), "{name} missing from {names:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_rotated_credential_is_used_by_next_call() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(200, "");
    let provider = RotatingCredentialProvider::new(Credential::new("AKIDFIRST", SECRET_ACCESS_KEY));
    let client = Client::builder()
        .context(Context::new().with_http_send(fake.clone()))
        .credential_provider(provider.clone())
        .runtime(Handle::current())
        .build()?;

    client.execute(&describe_instances()).await?;
    provider.rotate(Credential::new("AKIDSECOND", SECRET_ACCESS_KEY));
    client.execute(&describe_instances()).await?;

    let auth: Vec<String> = fake
        .requests()
        .iter()
        .map(|r| r.headers[http::header::AUTHORIZATION].to_str().unwrap().to_string())
        .collect();
    assert!(auth[0].contains("Credential=AKIDFIRST/"));
    assert!(auth[1].contains("Credential=AKIDSECOND/"));
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
struct GetCallerIdentityResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: CallerIdentity,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
    arn: String,
}

#[tokio::test]
async fn test_execute_decoded() -> anyhow::Result<()> {
    init();

    let fake = FakeHttpSend::status(
        200,
        "<GetCallerIdentityResponse><GetCallerIdentityResult><Arn>arn:aws:iam::123456789012:user/alice</Arn><UserId>AIDA</UserId><Account>123456789012</Account></GetCallerIdentityResult></GetCallerIdentityResponse>",
    );
    let req = ActionRequest::new("sts", "GetCallerIdentity").with_version("2011-06-15");

    let got = client(&fake)?
        .execute_decoded(&req, &XmlDecoder::<GetCallerIdentityResponse>::new())
        .await?;
    assert_eq!(got.result.account, "123456789012");
    assert_eq!(got.result.arn, "arn:aws:iam::123456789012:user/alice");
    Ok(())
}
