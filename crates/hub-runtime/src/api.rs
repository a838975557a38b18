//! In-memory [`ApiClient`] backed by a route table.
//!
//! Used by the demo host and the test suites. Routes answer with a fixed JSON
//! body or a fixed error status; anything unknown is a 404.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hub_types::{ApiClient, ApiError, GetQuery, PostQuery};
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
enum Fixture {
    Body(Value),
    Status(u16),
}

/// Route table client.
#[derive(Debug, Default)]
pub struct FixtureApiClient {
    routes: RwLock<HashMap<(Method, String), Fixture>>,
    latency: Option<Duration>,
    requests: AtomicU64,
}

impl FixtureApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_get(self, url: impl Into<String>, body: Value) -> Self {
        self.route(Method::Get, url, body);
        self
    }

    #[must_use]
    pub fn with_post(self, url: impl Into<String>, body: Value) -> Self {
        self.route(Method::Post, url, body);
        self
    }

    /// Delay every response. Cancellation is honoured while waiting.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer `method url` with `body`, replacing any earlier route.
    pub fn route(&self, method: Method, url: impl Into<String>, body: Value) {
        self.routes
            .write()
            .insert((method, url.into()), Fixture::Body(body));
    }

    /// Answer `method url` with an error status.
    pub fn fail(&self, method: Method, url: impl Into<String>, status: u16) {
        self.routes
            .write()
            .insert((method, url.into()), Fixture::Status(status));
    }

    /// Requests served so far, including failed ones.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn respond(
        &self,
        method: Method,
        url: &str,
        signal: Option<&CancellationToken>,
    ) -> Result<Value, ApiError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let work = async {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.lookup(method, url)
        };

        match signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    debug!(?method, url, "Request aborted");
                    Err(ApiError::Aborted { url: url.to_string() })
                }
                result = work => result,
            },
            None => work.await,
        }
    }

    fn lookup(&self, method: Method, url: &str) -> Result<Value, ApiError> {
        let fixture = self.routes.read().get(&(method, url.to_string())).cloned();
        match fixture {
            Some(Fixture::Body(body)) => Ok(body),
            Some(Fixture::Status(status)) => Err(ApiError::Status {
                url: url.to_string(),
                status,
            }),
            None => {
                debug!(?method, url, "No fixture for route");
                Err(ApiError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            }
        }
    }
}

#[async_trait]
impl ApiClient for FixtureApiClient {
    async fn get_json(&self, query: GetQuery) -> Result<Value, ApiError> {
        debug!(url = %query.url, params = query.params.len(), "GET");
        self.respond(Method::Get, &query.url, query.signal.as_ref())
            .await
    }

    async fn post_json(&self, query: PostQuery) -> Result<Value, ApiError> {
        debug!(url = %query.url, params = query.params.len(), "POST");
        self.respond(Method::Post, &query.url, query.signal.as_ref())
            .await
    }
}
