//! Core data models for cache invalidation

use crate::error::{InvalidationError, Result};
use http::header::{HeaderName, HeaderValue, HOST};
use http::{HeaderMap, Method};
use std::fmt;
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

/// Fingerprint of a pending invalidation, used to suppress duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u64);

impl Signature {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One logical invalidation intent, before it is fanned out to the servers
///
/// Header names are case-insensitive (they are stored as [`HeaderName`]s), so
/// `X-Foo` and `x-foo` are the same header both for `Host` precedence and for
/// the signature.
#[derive(Debug, Clone)]
pub struct InvalidationRequest {
    method: Method,
    target: String,
    headers: HeaderMap,
}

impl InvalidationRequest {
    /// Create a new InvalidationRequest
    ///
    /// # Arguments
    /// * `method` - HTTP verb, e.g. `PURGE`, `BAN` or `GET`
    /// * `target` - Absolute URL or path to invalidate
    /// * `headers` - Caller supplied headers
    ///
    /// When `target` contains a host, a `Host` header is derived from it
    /// (with the port unless it is the scheme default). An explicit `Host`
    /// header in `headers` always wins.
    pub fn new(method: &str, target: impl Into<String>, mut headers: HeaderMap) -> Result<Self> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| {
            InvalidationError::InvalidArgument(format!("invalid HTTP method {:?}: {}", method, e))
        })?;
        let target = target.into();

        if !headers.contains_key(HOST) {
            if let Some(host) = absolute_target(&target).and_then(|url| authority(&url)) {
                let value = HeaderValue::from_str(&host).map_err(|e| {
                    InvalidationError::InvalidArgument(format!(
                        "invalid host {:?} in {}: {}",
                        host, target, e
                    ))
                })?;
                headers.insert(HOST, value);
            }
        }

        Ok(InvalidationRequest {
            method,
            target,
            headers,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the request carries a non-empty `Host` header
    pub fn has_host(&self) -> bool {
        self.headers
            .get(HOST)
            .map(|v| !v.as_bytes().is_empty())
            .unwrap_or(false)
    }

    /// Compute the deduplication signature
    ///
    /// Hashes method, target and headers sorted by name. Values of a
    /// repeated header keep their relative order. Every field is length
    /// prefixed so no target can mimic a header.
    pub fn signature(&self) -> Signature {
        let mut headers: Vec<(&str, &[u8])> = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));

        let mut buf = Vec::with_capacity(64 + self.target.len());
        push_field(&mut buf, self.method.as_str().as_bytes());
        push_field(&mut buf, self.target.as_bytes());
        for (name, value) in headers {
            push_field(&mut buf, name.as_bytes());
            push_field(&mut buf, value);
        }

        Signature(xxh3_64(&buf))
    }
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buf.extend_from_slice(field);
}

/// A concrete request addressed to one caching proxy server
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl DispatchRequest {
    /// `host[:port]` of the caching proxy this request is sent to
    pub fn server_host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| authority(&url))
            .unwrap_or_else(|| self.url.clone())
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response received from a caching proxy that reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResponse {
    pub status: u16,
    pub reason: String,
}

/// Transport level failure for one request of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Caching proxy `host[:port]` the request was sent to
    pub host: String,
    /// Transport message (connect error, timeout, status line, ...)
    pub message: String,
    /// The response, when one was obtained
    pub response: Option<FailedResponse>,
}

/// Outcome of one dispatched request, reported by an [`HttpSender`](crate::HttpSender)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success { status: u16, reason: String },
    Failure(TransportFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success { .. })
    }
}

/// Build a [`HeaderMap`] from name/value pairs
///
/// Later pairs replace earlier ones with the same (case-insensitive) name.
pub fn header_map<I, K, V>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let (name, value) = header_pair(name.as_ref(), value.as_ref())?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Validate a single header name/value pair
pub(crate) fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        InvalidationError::InvalidArgument(format!("invalid header name {:?}: {}", name, e))
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        InvalidationError::InvalidArgument(format!(
            "invalid value {:?} for header {}: {}",
            value, name, e
        ))
    })?;
    Ok((header_name, header_value))
}

/// Parse `target` as an absolute URL with a host
pub(crate) fn absolute_target(target: &str) -> Option<Url> {
    Url::parse(target).ok().filter(|url| url.has_host())
}

/// `host[:port]`, the port omitted when it is the scheme default
pub(crate) fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
