//! HTTP transport used to deliver invalidation requests

use crate::error::{InvalidationError, Result};
use crate::models::{DispatchOutcome, DispatchRequest, FailedResponse, TransportFailure};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Delivers a batch of concrete requests to the caching proxies
///
/// Implementations may dispatch concurrently but must return exactly one
/// outcome per request, in batch order, and must never let one failing
/// request prevent the outcomes of the others from being reported.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, batch: Vec<DispatchRequest>) -> Vec<DispatchOutcome>;
}

/// Default sender backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    /// HTTP client for making requests
    http_client: Client,
    /// Maximum number of requests in flight per batch
    max_concurrent: usize,
}

impl ReqwestSender {
    /// Create a sender with a 10 second timeout and 8 concurrent requests
    pub fn new() -> Result<Self> {
        Self::with_options(Duration::from_secs(10), 8)
    }

    /// Create a sender with a custom timeout and concurrency limit
    pub fn with_options(timeout: Duration, max_concurrent: usize) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            // A redirect means the proxy did not invalidate anything
            .redirect(Policy::none())
            .build()
            .map_err(|e| InvalidationError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(http_client, max_concurrent))
    }

    /// Wrap an existing reqwest client
    ///
    /// The client should be built with `redirect::Policy::none()` so a
    /// proxy's 3xx answer is reported instead of followed.
    pub fn with_client(http_client: Client, max_concurrent: usize) -> Self {
        ReqwestSender {
            http_client,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Send one request and map the result to an outcome
    ///
    /// Any 3xx, 4xx or 5xx answer is a failure carrying the response.
    async fn send_one(client: Client, request: DispatchRequest) -> DispatchOutcome {
        let host = request.server_host();
        debug!("Sending {} {} (host header {:?})", request.method, request.url, request.header("host"));

        let response = client
            .request(request.method, &request.url)
            .headers(request.headers)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let reason = status.canonical_reason().unwrap_or("").to_string();
                if status.is_redirection() || status.is_client_error() || status.is_server_error() {
                    DispatchOutcome::Failure(TransportFailure {
                        host,
                        message: format!("HTTP {} {}", status.as_u16(), reason),
                        response: Some(FailedResponse {
                            status: status.as_u16(),
                            reason,
                        }),
                    })
                } else {
                    DispatchOutcome::Success {
                        status: status.as_u16(),
                        reason,
                    }
                }
            }
            Err(e) => DispatchOutcome::Failure(TransportFailure {
                host,
                message: e.to_string(),
                response: None,
            }),
        }
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(&self, batch: Vec<DispatchRequest>) -> Vec<DispatchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = Vec::with_capacity(batch.len());

        for request in batch {
            let sem = semaphore.clone();
            let client = self.http_client.clone();
            let host = request.server_host();

            let task = tokio::spawn(async move {
                // Closed semaphore only means we lost the limit, not the request
                let _permit = sem.acquire_owned().await.ok();
                Self::send_one(client, request).await
            });

            tasks.push((host, task));
        }

        // Join in batch order so outcomes line up with requests
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (host, task) in tasks {
            let outcome = task.await.unwrap_or_else(|e| {
                DispatchOutcome::Failure(TransportFailure {
                    host,
                    message: format!("Task join error: {}", e),
                    response: None,
                })
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}
