//! Caching proxy client
//!
//! [`ProxyClient`] queues purge, refresh and ban invalidations and sends
//! them to every configured caching proxy on [`flush`](ProxyClient::flush).
//! Nothing is sent before a flush, so many invalidations can be collected
//! during a request and delivered in one batch at the end.

use crate::config::InvalidatorConfig;
use crate::error::{InvalidationError, Result};
use crate::failure::classify;
use crate::metrics::InvalidationMetrics;
use crate::models::{header_pair, InvalidationRequest};
use crate::protocol::{Operation, ProxyProtocol};
use crate::queue::RequestQueue;
use crate::sender::{HttpSender, ReqwestSender};
use crate::url_filter::UrlFilter;
use crate::varnish::Varnish;
use http::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Client for one fleet of caching proxies speaking protocol `P`
pub struct ProxyClient<P: ProxyProtocol = Varnish> {
    protocol: P,
    queue: RequestQueue,
    sender: Arc<dyn HttpSender>,
    default_ban_headers: HeaderMap,
    metrics: Option<Arc<InvalidationMetrics>>,
}

impl ProxyClient<Varnish> {
    /// Create a Varnish client using the default reqwest sender
    pub fn varnish<S: AsRef<str>>(servers: &[S], base_url: Option<&str>) -> Result<Self> {
        let sender = Arc::new(ReqwestSender::new()?);
        Self::new(Varnish, servers, base_url, sender)
    }

    /// Create a Varnish client from configuration
    pub fn from_config(config: &InvalidatorConfig) -> Result<Self> {
        config.validate()?;

        let sender = ReqwestSender::with_options(
            Duration::from_secs(config.request_timeout_secs),
            config.max_concurrent_requests,
        )?;

        let mut client = Self::new(
            Varnish,
            config.servers.as_slice(),
            config.base_url.as_deref(),
            Arc::new(sender),
        )?;
        for (name, pattern) in &config.default_ban_headers {
            client.set_default_ban_header(name, pattern)?;
        }

        info!(
            "Created {} client for {} caching proxy server(s)",
            client.protocol.name(),
            client.queue.servers().len()
        );
        Ok(client)
    }
}

impl<P: ProxyProtocol> ProxyClient<P> {
    /// Create a new ProxyClient
    ///
    /// # Arguments
    /// * `protocol` - Caching proxy flavor
    /// * `servers` - Caching proxy addresses, including port if not 80
    /// * `base_url` - Application host, optionally with a base path. Required
    ///   when purging or refreshing paths instead of absolute URLs.
    /// * `sender` - Transport used on flush
    pub fn new<S: AsRef<str>>(
        protocol: P,
        servers: &[S],
        base_url: Option<&str>,
        sender: Arc<dyn HttpSender>,
    ) -> Result<Self> {
        let queue = RequestQueue::new(servers, base_url, UrlFilter::for_protocol(&protocol))?;
        let default_ban_headers = protocol.default_ban_headers();

        Ok(ProxyClient {
            protocol,
            queue,
            sender,
            default_ban_headers,
            metrics: None,
        })
    }

    /// Enable Prometheus metrics
    pub fn with_metrics(mut self, metrics: Arc<InvalidationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Number of distinct invalidations waiting for a flush
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Replace the caching proxy servers
    pub fn set_servers<S: AsRef<str>>(&mut self, servers: &[S]) -> Result<()> {
        self.queue.set_servers(servers)
    }

    /// Set or clear the application base URL
    pub fn set_base_url(&mut self, base_url: Option<&str>) -> Result<()> {
        self.queue.set_base_url(base_url)
    }

    /// Set one default ban header, replacing any previous value
    pub fn set_default_ban_header(&mut self, name: &str, pattern: &str) -> Result<()> {
        let (name, value) = header_pair(name, pattern)?;
        self.default_ban_headers.insert(name, value);
        Ok(())
    }

    /// Merge default ban headers, replacing values for the given names
    pub fn set_default_ban_headers(&mut self, headers: HeaderMap) {
        merge_headers(&mut self.default_ban_headers, headers);
    }

    pub fn default_ban_headers(&self) -> &HeaderMap {
        &self.default_ban_headers
    }

    /// Queue a purge of one path or absolute URL
    ///
    /// Fails with [`InvalidationError::MissingHost`] when `url` is a path and
    /// no base URL is configured. The path of an absolute `url` is sent in
    /// normalized form (`/a/../b` as `/b`, spaces percent-encoded).
    pub fn purge(&self, url: &str, headers: HeaderMap) -> Result<&Self> {
        self.queue_request(Operation::Purge, url, headers, true)?;
        Ok(self)
    }

    /// Queue a refresh of one path or absolute URL
    ///
    /// The proxy fetches a fresh copy from the backend and stores it.
    pub fn refresh(&self, url: &str, mut headers: HeaderMap) -> Result<&Self> {
        self.protocol.prepare_refresh_headers(&mut headers);
        self.queue_request(Operation::Refresh, url, headers, true)?;
        Ok(self)
    }

    /// Queue a ban on arbitrary header patterns
    ///
    /// Default ban headers fill in every header the caller did not supply.
    pub fn ban(&self, headers: HeaderMap) -> Result<&Self> {
        let mut merged = self.default_ban_headers.clone();
        merge_headers(&mut merged, headers);

        self.queue_request(Operation::Ban, self.protocol.ban_target(), merged, false)?;
        Ok(self)
    }

    /// Queue a ban on a URL pattern, optionally restricted by content type
    /// and hosts
    ///
    /// `hosts` of `Some(&[])` is rejected with
    /// [`InvalidationError::InvalidArgument`] before anything is queued.
    pub fn ban_path(
        &self,
        path_pattern: &str,
        content_type: Option<&str>,
        hosts: Option<&[&str]>,
    ) -> Result<&Self> {
        let headers = self
            .protocol
            .build_ban_headers(path_pattern, content_type, hosts)?;
        self.ban(headers)
    }

    /// Discard all queued invalidations without sending them
    pub fn clear(&self) {
        self.queue.clear();
    }

    /// Send all queued invalidations to every caching proxy
    ///
    /// # Returns
    /// * `Ok(n)` with the number of distinct invalidations flushed. This is
    ///   not the number of requests sent, which is `n` times the number of
    ///   servers.
    /// * `Err(InvalidationError::Proxy)` with every per-server failure when
    ///   any request failed. The queue is already empty at that point.
    pub async fn flush(&self) -> Result<usize> {
        let snapshot = self.queue.take();
        if snapshot.is_empty() {
            debug!("Nothing to flush");
            return Ok(0);
        }

        let start_time = Instant::now();
        let requests = self.queue.expand_snapshot(&snapshot);
        info!(
            "Flushing {} invalidation(s) as {} request(s) to {}",
            snapshot.len(),
            requests.len(),
            self.protocol.name()
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatched(requests.len());
        }

        let outcomes = self.sender.send(requests.clone()).await;
        let result = classify(&requests, outcomes);

        if let Some(metrics) = &self.metrics {
            metrics.record_flush_duration(start_time.elapsed().as_secs_f64());
        }

        match result {
            Ok(()) => Ok(snapshot.len()),
            Err(aggregate) => {
                warn!(
                    "{} of {} invalidation request(s) failed",
                    aggregate.len(),
                    requests.len()
                );
                if let Some(metrics) = &self.metrics {
                    for failure in &aggregate {
                        metrics.record_failure(failure.kind());
                    }
                }
                Err(InvalidationError::Proxy(aggregate))
            }
        }
    }

    fn queue_request(
        &self,
        operation: Operation,
        url: &str,
        headers: HeaderMap,
        require_host: bool,
    ) -> Result<()> {
        if !self.protocol.supports(operation) {
            return Err(InvalidationError::UnsupportedOperation {
                proxy: self.protocol.name(),
                operation,
            });
        }

        let request = InvalidationRequest::new(self.protocol.method(operation), url, headers)?;
        if require_host && !request.has_host() && self.queue.default_host().is_none() {
            return Err(InvalidationError::MissingHost(url.to_string()));
        }

        debug!("Queuing {} {}", request.method(), request.target());
        let accepted = self.queue.add(request);
        if let Some(metrics) = &self.metrics {
            metrics.record_queued(operation.as_str(), accepted);
        }
        Ok(())
    }
}

/// Replace every header of `into` named in `from`, keeping all of `from`'s values
fn merge_headers(into: &mut HeaderMap, from: HeaderMap) {
    let mut current = None;
    for (name, value) in from {
        // `None` names continue the previous header's values
        if let Some(name) = name {
            into.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            into.append(name.clone(), value);
        }
    }
}
