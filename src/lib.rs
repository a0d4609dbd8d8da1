//! Proxy Invalidate
//!
//! Client-side cache invalidation for HTTP caching proxies such as Varnish.
//! Invalidations are queued during a request and sent to every caching proxy
//! server in one batch on flush.
//!
//! # Overview
//!
//! An application that sits behind one or more caching proxies needs to tell
//! them when content changes. This crate turns high-level intents (purge a
//! URL, refresh a URL, ban everything matching a pattern, ban by cache tag)
//! into the HTTP requests a Varnish VCL understands, deduplicates them, and
//! fans them out to every configured proxy.
//!
//! # Features
//!
//! - **Purge, refresh and ban**: Single URLs or header pattern bans
//! - **Tag invalidation**: Ban every object carrying one of a set of tags
//! - **Deduplication**: Identical invalidations are sent once per flush
//! - **Concurrent dispatch**: Requests to all servers are sent in parallel
//! - **Failure aggregation**: Every per-server failure is collected and reported
//! - **Metrics Collection**: Optional Prometheus counters and histograms
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use proxy_invalidate::{CacheInvalidator, InvalidatorConfig};
//! use http::HeaderMap;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from file
//! let config = InvalidatorConfig::from_file("invalidator.yaml")?;
//! let invalidator = CacheInvalidator::from_config(&config)?;
//!
//! invalidator
//!     .invalidate_path("/news/42", HeaderMap::new())?
//!     .invalidate_tags(&["news-42"])?;
//!
//! let flushed = invalidator.flush().await?;
//! println!("Flushed {} invalidations", flushed);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`CacheInvalidator`]: High-level entry point with capability checks and tags
//! - [`ProxyClient`]: Queues invalidations and flushes them to the servers
//! - [`RequestQueue`]: Deduplicates pending requests and expands them per server
//! - [`ProxyProtocol`]: Dialect of one caching proxy flavor, e.g. [`Varnish`]
//! - [`HttpSender`]: Transport, [`ReqwestSender`] by default
//! - [`AggregateInvalidationError`]: Every failure of one flush
//! - [`InvalidationMetrics`]: Prometheus metrics
//!
//! # Configuration
//!
//! Configuration is loaded from a YAML file:
//!
//! ```yaml
//! servers:
//!   - 127.0.0.1:6081
//!   - 10.0.0.2:6081
//! base_url: www.example.com
//! request_timeout_secs: 10
//! max_concurrent_requests: 8
//! tags_header: X-Cache-Tags
//! ```
//!
//! See [`InvalidatorConfig`] for detailed configuration options.

pub mod config;
pub mod models;
pub mod error;
pub mod url_filter;
pub mod queue;
pub mod protocol;
pub mod varnish;
pub mod sender;
pub mod mock_sender;
pub mod failure;
pub mod client;
pub mod invalidator;
pub mod metrics;

// Re-export commonly used types
pub use config::InvalidatorConfig;
pub use models::{
    header_map, DispatchOutcome, DispatchRequest, FailedResponse, InvalidationRequest, Signature,
    TransportFailure,
};
pub use error::{InvalidationError, Result};
pub use url_filter::{BaseUrl, UrlFilter};
pub use queue::{QueueSnapshot, RequestQueue};
pub use protocol::{Operation, ProxyProtocol};
pub use varnish::Varnish;
pub use sender::{HttpSender, ReqwestSender};
pub use mock_sender::RecordingSender;
pub use failure::{
    AggregateInvalidationError, ProxyFailure, ProxyResponseError, ProxyUnreachableError,
};
pub use client::ProxyClient;
pub use invalidator::CacheInvalidator;
pub use metrics::InvalidationMetrics;
