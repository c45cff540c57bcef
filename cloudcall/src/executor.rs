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

//! Non-blocking dispatch of signed requests.

use cloudcall_core::{
    Context, Error, Result, SignedRequest, TransportFailure, TransportResponse,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Options controlling dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// End-to-end deadline covering the wait for a connection slot, the send
    /// and the full body read.
    pub timeout: Duration,
    /// Bound of concurrent requests (and therefore connections) per host.
    pub max_connections_per_host: usize,
    /// Fail with `PoolExhausted` instead of waiting when a host is at its
    /// bound.
    pub fail_fast: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_connections_per_host: 16,
            fail_fast: false,
        }
    }
}

/// Executor owns the transport and dispatches signed requests on an
/// explicitly provided tokio runtime.
///
/// It never retries: every failure is handed back to the caller. Cloning is
/// cheap and clones share the per-host limits.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    handle: Handle,
    ctx: Context,
    options: ExecutorOptions,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    shutdown: CancellationToken,
    in_flight: AtomicUsize,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("options", &self.inner.options)
            .field("in_flight", &self.in_flight())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Executor {
    /// Create an executor spawning its calls on `handle` and sending them
    /// through the transport of `ctx`.
    pub fn new(handle: Handle, ctx: Context, options: ExecutorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                ctx,
                options,
                hosts: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                in_flight: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Options in use.
    pub fn options(&self) -> &ExecutorOptions {
        &self.inner.options
    }

    /// Submit a signed request. The returned handle completes exactly once.
    pub fn submit(&self, req: SignedRequest) -> PendingCall {
        self.submit_with_cancel(req, CancellationToken::new())
    }

    /// Submit a signed request that is also aborted when `cancel` fires.
    pub fn submit_with_cancel(&self, req: SignedRequest, cancel: CancellationToken) -> PendingCall {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();
        let inner = self.inner.clone();
        let call_token = token.clone();

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let task = self.inner.handle.spawn(async move {
            let _guard = InFlightGuard(inner.clone());
            let timeout = inner.options.timeout;

            tokio::select! {
                biased;
                _ = call_token.cancelled() => {
                    debug!("call {id} cancelled before completion");
                    Err(Error::cancelled("call cancelled"))
                }
                _ = cancel.cancelled() => {
                    debug!("call {id} cancelled by caller");
                    Err(Error::cancelled("call cancelled"))
                }
                res = tokio::time::timeout(timeout, inner.dispatch(id, req)) => match res {
                    Ok(res) => res,
                    Err(_) => {
                        warn!("call {id} timed out after {timeout:?}");
                        Err(Error::timeout(format!("call timed out after {timeout:?}")))
                    }
                },
            }
        });

        PendingCall { token, task }
    }

    /// Submit and wait for the response.
    pub async fn execute(&self, req: SignedRequest) -> Result<TransportResponse> {
        self.submit(req).await
    }

    /// Cancel every pending call and reject later submissions with `Cancelled`.
    pub fn shutdown(&self) {
        debug!("executor shutting down with {} calls in flight", self.in_flight());
        self.inner.shutdown.cancel();
    }

    /// Whether [`Executor::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of calls submitted and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn semaphore_for(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.options.max_connections_per_host)))
            .clone()
    }

    async fn dispatch(&self, id: u64, req: SignedRequest) -> Result<TransportResponse> {
        let host = req
            .request()
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let semaphore = self.semaphore_for(&host);
        let mut slot = HostSlot {
            inner: self,
            host,
            permit: None,
        };
        let host = slot.host.as_str();

        let permit = if self.options.fail_fast {
            semaphore.try_acquire_owned().map_err(|_| {
                Error::transport(
                    TransportFailure::PoolExhausted,
                    format!("connection limit for {host} reached"),
                )
            })?
        } else {
            semaphore
                .acquire_owned()
                .await
                .map_err(|_| Error::cancelled("connection pool closed"))?
        };
        slot.permit = Some(permit);

        let method = req.request().method().clone();
        debug!(
            "call {id} dispatching {method} {} signed with {}",
            req.request().uri().path(),
            req.scheme()
        );
        let resp = self.ctx.http_send(req.into_request()).await;
        match &resp {
            Ok(r) => debug!("call {id} got status {} from {host}", r.status()),
            Err(e) => debug!("call {id} to {host} failed: {e}"),
        }
        resp
    }
}

/// HostSlot holds one call's claim on a host limiter.
///
/// On drop the limiter is removed from the map once no call holds or
/// awaits it, so the map only tracks hosts with calls in flight.
struct HostSlot<'a> {
    inner: &'a Inner,
    host: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for HostSlot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());

        let mut hosts = self
            .inner
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = hosts.get(&self.host).is_some_and(|s| {
            Arc::strong_count(s) == 1
                && s.available_permits() == self.inner.options.max_connections_per_host
        });
        if idle {
            hosts.remove(&self.host);
        }
    }
}

struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// PendingCall is the handle of one submitted request.
///
/// Awaiting it yields the raw response or a transport failure. Dropping it
/// or calling [`PendingCall::cancel`] aborts the in-flight transport
/// operation and releases its connection slot.
#[must_use = "a pending call does nothing unless awaited"]
pub struct PendingCall {
    token: CancellationToken,
    task: JoinHandle<Result<TransportResponse>>,
}

impl PendingCall {
    /// Cancel the call. The handle completes with a `Cancelled` failure
    /// unless it already completed.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this call when fired.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Future for PendingCall {
    type Output = Result<TransportResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(e)) if e.is_cancelled() => {
                Poll::Ready(Err(Error::cancelled("call aborted")))
            }
            Poll::Ready(Err(e)) => {
                Poll::Ready(Err(Error::unexpected("call task failed").with_source(e)))
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cloudcall_core::{time, HttpSend, SigningScheme};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Clone, Default)]
    struct FakeHttpSend {
        hang: Arc<AtomicBool>,
        started: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl HttpSend for FakeHttpSend {
        async fn http_send(&self, _req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(http::Response::new(Bytes::from_static(b"ok")))
        }
    }

    fn signed(host: &str) -> SignedRequest {
        let req = http::Request::get(format!("https://{host}/key"))
            .body(Bytes::new())
            .unwrap();
        SignedRequest::new(req, SigningScheme::V4, "signature".to_string(), time::now()).unwrap()
    }

    fn executor(fake: &FakeHttpSend) -> Executor {
        Executor::new(
            Handle::current(),
            Context::new().with_http_send(fake.clone()),
            ExecutorOptions::default(),
        )
    }

    fn tracked_hosts(executor: &Executor) -> usize {
        executor.inner.hosts.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_host_limiters_released_after_completion() {
        let _ = env_logger::builder().is_test(true).try_init();

        let fake = FakeHttpSend::default();
        let executor = executor(&fake);

        for i in 0..100 {
            let resp = executor
                .execute(signed(&format!("bucket{i}.example.com")))
                .await
                .unwrap();
            assert_eq!(resp.body(), &Bytes::from_static(b"ok"));
        }

        assert_eq!(fake.started.load(Ordering::SeqCst), 100);
        assert_eq!(tracked_hosts(&executor), 0);
    }

    #[tokio::test]
    async fn test_host_limiters_released_after_cancel() {
        let _ = env_logger::builder().is_test(true).try_init();

        let fake = FakeHttpSend::default();
        fake.hang.store(true, Ordering::SeqCst);
        let executor = executor(&fake);

        let first = executor.submit(signed("slow.example.com"));
        let second = executor.submit(signed("slow.example.com"));
        while fake.started.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(tracked_hosts(&executor), 1);

        first.cancel();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(tracked_hosts(&executor), 1);

        second.cancel();
        assert!(second.await.unwrap_err().is_cancelled());
        assert_eq!(tracked_hosts(&executor), 0);
        assert_eq!(executor.in_flight(), 0);
    }
}
