//! High-level invalidation entry point
//!
//! [`CacheInvalidator`] wraps a [`ProxyClient`] and checks operations against
//! the proxy's capabilities before queuing them. It also knows how to turn
//! cache tags into a ban and logs every failure of a flush.

use crate::client::ProxyClient;
use crate::config::InvalidatorConfig;
use crate::error::{InvalidationError, Result};
use crate::models::header_pair;
use crate::protocol::{Operation, ProxyProtocol};
use crate::varnish::Varnish;
use http::header::HeaderName;
use http::HeaderMap;
use tracing::{error, info};

/// Default header carrying cache tags
pub const DEFAULT_TAGS_HEADER: &str = "X-Cache-Tags";

pub struct CacheInvalidator<P: ProxyProtocol = Varnish> {
    client: ProxyClient<P>,
    tags_header: HeaderName,
}

impl CacheInvalidator<Varnish> {
    /// Build a Varnish invalidator from configuration
    pub fn from_config(config: &InvalidatorConfig) -> Result<Self> {
        let mut invalidator = Self::new(ProxyClient::from_config(config)?);
        invalidator.set_tags_header(&config.tags_header)?;
        Ok(invalidator)
    }
}

impl<P: ProxyProtocol> CacheInvalidator<P> {
    pub fn new(client: ProxyClient<P>) -> Self {
        CacheInvalidator {
            client,
            tags_header: HeaderName::from_static("x-cache-tags"),
        }
    }

    pub fn client(&self) -> &ProxyClient<P> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ProxyClient<P> {
        &mut self.client
    }

    /// Whether the proxy supports an operation
    pub fn supports(&self, operation: Operation) -> bool {
        self.client.protocol().supports(operation)
    }

    /// Change the header used for tag invalidation
    pub fn set_tags_header(&mut self, name: &str) -> Result<()> {
        let (name, _) = header_pair(name, "")?;
        self.tags_header = name;
        Ok(())
    }

    pub fn tags_header(&self) -> &HeaderName {
        &self.tags_header
    }

    /// Remove a path or absolute URL from the cache
    pub fn invalidate_path(&self, path: &str, headers: HeaderMap) -> Result<&Self> {
        self.require(Operation::Purge)?;
        self.client.purge(path, headers)?;
        Ok(self)
    }

    /// Have the proxy fetch a fresh copy of a path or absolute URL
    pub fn refresh_path(&self, path: &str, headers: HeaderMap) -> Result<&Self> {
        self.require(Operation::Refresh)?;
        self.client.refresh(path, headers)?;
        Ok(self)
    }

    /// Ban every object matching the given header patterns
    ///
    /// ```no_run
    /// # use proxy_invalidate::{header_map, CacheInvalidator, ProxyClient};
    /// # fn main() -> proxy_invalidate::Result<()> {
    /// let invalidator = CacheInvalidator::new(ProxyClient::varnish(&["127.0.0.1"], None)?);
    /// invalidator.invalidate(header_map([("X-Url", "^/static/")])?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn invalidate(&self, headers: HeaderMap) -> Result<&Self> {
        self.require(Operation::Ban)?;
        self.client.ban(headers)?;
        Ok(self)
    }

    /// Ban every object whose URL matches `path_pattern`, optionally
    /// restricted to a content type pattern and a list of hosts
    pub fn invalidate_regex(
        &self,
        path_pattern: &str,
        content_type: Option<&str>,
        hosts: Option<&[&str]>,
    ) -> Result<&Self> {
        self.require(Operation::Ban)?;
        self.client.ban_path(path_pattern, content_type, hosts)?;
        Ok(self)
    }

    /// Ban every object tagged with at least one of `tags`
    pub fn invalidate_tags(&self, tags: &[&str]) -> Result<&Self> {
        self.require(Operation::Ban)?;

        let pattern = self.client.protocol().build_tag_pattern(tags)?;
        let (_, value) = header_pair(self.tags_header.as_str(), &pattern)?;
        let mut headers = HeaderMap::new();
        headers.insert(self.tags_header.clone(), value);

        self.client.ban(headers)?;
        Ok(self)
    }

    /// Send all queued invalidations
    ///
    /// Every failure is logged before the aggregate is returned.
    pub async fn flush(&self) -> Result<usize> {
        match self.client.flush().await {
            Ok(count) => {
                if count > 0 {
                    info!("Flushed {} invalidation(s)", count);
                }
                Ok(count)
            }
            Err(InvalidationError::Proxy(aggregate)) => {
                for failure in &aggregate {
                    error!(
                        host = failure.host(),
                        kind = failure.kind(),
                        "Cache invalidation failed: {}",
                        failure
                    );
                }
                Err(InvalidationError::Proxy(aggregate))
            }
            Err(e) => Err(e),
        }
    }

    fn require(&self, operation: Operation) -> Result<()> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(InvalidationError::UnsupportedOperation {
                proxy: self.client.protocol().name(),
                operation,
            })
        }
    }
}
