//! Validation of caching proxy server and application base URLs

use crate::error::{InvalidationError, Result};
use crate::models::authority;
use crate::protocol::ProxyProtocol;
use tracing::debug;
use url::Url;

const SERVER_PARTS: [&str; 3] = ["scheme", "host", "port"];

/// Validated application base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    /// Normalized URL, without trailing slash
    pub url: String,
    /// `host[:port]` used as `Host` header for requests lacking one
    pub default_host: String,
    /// Path prefix for relative invalidation targets, without trailing slash
    pub base_path: String,
}

/// URL filter configured with the schemes a caching proxy accepts
#[derive(Debug, Clone)]
pub struct UrlFilter {
    default_scheme: String,
    allowed_schemes: Vec<String>,
}

impl UrlFilter {
    /// Create a filter with an explicit default scheme and allowed schemes
    pub fn new(default_scheme: impl Into<String>, allowed_schemes: &[&str]) -> Self {
        UrlFilter {
            default_scheme: default_scheme.into(),
            allowed_schemes: allowed_schemes.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    /// Create a filter from a proxy protocol's scheme rules
    pub fn for_protocol<P: ProxyProtocol + ?Sized>(protocol: &P) -> Self {
        Self::new(protocol.default_scheme(), protocol.allowed_schemes())
    }

    pub fn allowed_schemes(&self) -> &[String] {
        &self.allowed_schemes
    }

    /// Validate a caching proxy server address
    ///
    /// Only scheme, host and port are allowed. Returns `scheme://host[:port]`.
    pub fn filter_server(&self, server: &str) -> Result<String> {
        let (candidate, url) = self.parse(server)?;

        let has_path = !matches!(url.path(), "" | "/");
        if has_path
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
        {
            return Err(InvalidationError::invalid_url_parts(candidate, &SERVER_PARTS));
        }

        let host = authority(&url)
            .ok_or_else(|| InvalidationError::invalid_url(&candidate, Some("missing host")))?;
        Ok(format!("{}://{}", url.scheme(), host))
    }

    /// Validate the application base URL and split it into host and path
    pub fn filter_base_url(&self, base_url: &str) -> Result<BaseUrl> {
        let (candidate, url) = self.parse(base_url)?;

        let default_host = authority(&url)
            .ok_or_else(|| InvalidationError::invalid_url(&candidate, Some("missing host")))?;
        let base_path = url.path().trim_end_matches('/').to_string();

        Ok(BaseUrl {
            url: candidate.trim_end_matches('/').to_string(),
            default_host,
            base_path,
        })
    }

    /// Prefix the default scheme when missing, parse and check the scheme
    fn parse(&self, raw: &str) -> Result<(String, Url)> {
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("{}://{}", self.default_scheme, raw)
        };

        let url = Url::parse(&candidate).map_err(|e| {
            debug!("Rejecting URL {:?}: {}", candidate, e);
            InvalidationError::invalid_url(&candidate, None)
        })?;

        let scheme = url.scheme();
        if !self.allowed_schemes.iter().any(|allowed| allowed == scheme) {
            let allowed: Vec<&str> = self.allowed_schemes.iter().map(String::as_str).collect();
            return Err(InvalidationError::invalid_url_scheme(&candidate, scheme, &allowed));
        }

        if !url.has_host() {
            return Err(InvalidationError::invalid_url(&candidate, Some("missing host")));
        }

        Ok((candidate, url))
    }
}
