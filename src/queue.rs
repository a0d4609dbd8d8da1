//! Deduplicating queue of pending invalidations
//!
//! The queue owns the caching proxy servers and the application base URL.
//! Queued [`InvalidationRequest`]s are kept unique by signature; at flush
//! time each one is expanded into one [`DispatchRequest`] per server.

use crate::error::{InvalidationError, Result};
use crate::models::{absolute_target, DispatchRequest, InvalidationRequest, Signature};
use crate::url_filter::{BaseUrl, UrlFilter};
use http::header::{HeaderValue, HOST};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use url::Position;

/// Unique pending requests in insertion order
#[derive(Debug, Default)]
struct Pending {
    requests: Vec<InvalidationRequest>,
    signatures: HashSet<Signature>,
}

/// Detached set of pending requests, taken out of the queue for a flush
#[derive(Debug, Default)]
pub struct QueueSnapshot {
    requests: Vec<InvalidationRequest>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[InvalidationRequest] {
        &self.requests
    }
}

/// Queue of invalidation requests for a fleet of caching proxies
#[derive(Debug)]
pub struct RequestQueue {
    filter: UrlFilter,
    servers: Vec<String>,
    base_url: Option<BaseUrl>,
    pending: Mutex<Pending>,
}

impl RequestQueue {
    /// Create a new RequestQueue
    ///
    /// # Arguments
    /// * `servers` - Caching proxy addresses, e.g. `127.0.0.1:6081`
    /// * `base_url` - Application host, optionally with a base path
    /// * `filter` - URL rules of the caching proxy
    ///
    /// # Returns
    /// * `Err(InvalidationError::InvalidUrl)` if a server or the base URL is invalid
    /// * `Err(InvalidationError::InvalidArgument)` if `servers` is empty
    pub fn new<S: AsRef<str>>(
        servers: &[S],
        base_url: Option<&str>,
        filter: UrlFilter,
    ) -> Result<Self> {
        let mut queue = RequestQueue {
            filter,
            servers: Vec::new(),
            base_url: None,
            pending: Mutex::new(Pending::default()),
        };
        queue.set_servers(servers)?;
        queue.set_base_url(base_url)?;
        Ok(queue)
    }

    /// Replace the caching proxy servers
    ///
    /// Either every server is valid and the whole list is replaced, or the
    /// previous list is kept.
    pub fn set_servers<S: AsRef<str>>(&mut self, servers: &[S]) -> Result<()> {
        if servers.is_empty() {
            return Err(InvalidationError::InvalidArgument(
                "at least one caching proxy server is required".to_string(),
            ));
        }

        let servers = servers
            .iter()
            .map(|server| self.filter.filter_server(server.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        debug!("Configured caching proxy servers: {:?}", servers);
        self.servers = servers;
        Ok(())
    }

    /// Set or clear the application base URL
    pub fn set_base_url(&mut self, base_url: Option<&str>) -> Result<()> {
        self.base_url = match base_url {
            Some(url) => Some(self.filter.filter_base_url(url)?),
            None => None,
        };
        Ok(())
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn base_url(&self) -> Option<&BaseUrl> {
        self.base_url.as_ref()
    }

    /// `Host` header used for requests that do not carry one
    pub fn default_host(&self) -> Option<&str> {
        self.base_url.as_ref().map(|b| b.default_host.as_str())
    }

    /// Queue a request
    ///
    /// Returns `false` when a request with the same signature is already
    /// pending; the first one wins.
    pub fn add(&self, request: InvalidationRequest) -> bool {
        let signature = request.signature();
        let mut pending = self.lock();
        if !pending.signatures.insert(signature) {
            debug!(
                "Skipping duplicate {} {} (signature {})",
                request.method(),
                request.target(),
                signature
            );
            return false;
        }
        pending.requests.push(request);
        true
    }

    /// Number of distinct pending invalidations
    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all pending requests without sending them
    pub fn clear(&self) {
        *self.lock() = Pending::default();
    }

    /// Swap the pending set for an empty one and return the old contents
    ///
    /// Requests queued after this call land in the fresh set.
    pub fn take(&self) -> QueueSnapshot {
        let pending = std::mem::take(&mut *self.lock());
        QueueSnapshot {
            requests: pending.requests,
        }
    }

    /// Expand all pending requests without removing them
    pub fn all(&self) -> Vec<DispatchRequest> {
        let requests = self.lock().requests.clone();
        self.expand(&requests)
    }

    /// Expand a snapshot into concrete requests
    pub fn expand_snapshot(&self, snapshot: &QueueSnapshot) -> Vec<DispatchRequest> {
        self.expand(&snapshot.requests)
    }

    /// One concrete request per pending request and server, request-major:
    /// requests in insertion order, servers in configured order
    fn expand(&self, requests: &[InvalidationRequest]) -> Vec<DispatchRequest> {
        let mut expanded = Vec::with_capacity(requests.len() * self.servers.len());

        for request in requests {
            let mut headers = request.headers().clone();
            if !request.has_host() {
                headers.remove(HOST);
                if let Some(host) = self.default_host() {
                    if let Ok(value) = HeaderValue::from_str(host) {
                        headers.insert(HOST, value);
                    }
                }
            }

            for server in &self.servers {
                expanded.push(DispatchRequest {
                    method: request.method().clone(),
                    url: self.combine(server, request.target()),
                    headers: headers.clone(),
                });
            }
        }

        expanded
    }

    /// Address `target` to `server`
    ///
    /// Absolute targets keep only their path, query and fragment, in the
    /// normalized form the HTTP client would send anyway: dot-segments are
    /// resolved, unsafe characters percent-encoded and an empty path becomes
    /// `/`. Relative targets are appended to the base path with exactly one
    /// slash.
    fn combine(&self, server: &str, target: &str) -> String {
        match absolute_target(target) {
            Some(url) => format!("{}{}", server, &url[Position::BeforePath..]),
            None => {
                let base_path = self
                    .base_url
                    .as_ref()
                    .map(|b| b.base_path.as_str())
                    .unwrap_or("");
                format!("{}{}/{}", server, base_path, target.trim_start_matches('/'))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
