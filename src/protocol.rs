//! Caching proxy protocol abstraction
//!
//! Each caching proxy flavor speaks its own dialect of invalidation: which
//! HTTP verbs it understands, which headers carry ban patterns, and which URL
//! schemes its admin interface accepts. [`ProxyProtocol`] captures that
//! dialect so [`ProxyClient`](crate::ProxyClient) can stay flavor-agnostic.

use crate::error::Result;
use http::HeaderMap;
use std::fmt;

/// Kind of invalidation a caller can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Remove one URL from the cache
    Purge,
    /// Re-fetch one URL and store the fresh copy
    Refresh,
    /// Invalidate everything matching a set of header patterns
    Ban,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Purge => "purge",
            Operation::Refresh => "refresh",
            Operation::Ban => "ban",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability interface implemented once per caching proxy flavor
pub trait ProxyProtocol: Send + Sync {
    /// Human readable proxy name, used in errors and logs
    fn name(&self) -> &'static str;

    /// Schemes the proxy accepts for server and base URLs
    fn allowed_schemes(&self) -> &[&'static str];

    /// Scheme assumed when a server or base URL omits one
    fn default_scheme(&self) -> &'static str {
        "http"
    }

    /// Whether the proxy understands the given operation
    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    /// HTTP verb used on the wire for an operation
    fn method(&self, operation: Operation) -> &'static str;

    /// Path every ban request is sent to
    fn ban_target(&self) -> &'static str {
        "/"
    }

    /// Headers that make an empty ban match everything
    fn default_ban_headers(&self) -> HeaderMap;

    /// Build ban headers for a URL pattern, optional content type pattern and
    /// optional host list
    ///
    /// `None` for `content_type` or `hosts` leaves the default match-anything
    /// pattern in place. An empty host list is rejected.
    fn build_ban_headers(
        &self,
        path_pattern: &str,
        content_type: Option<&str>,
        hosts: Option<&[&str]>,
    ) -> Result<HeaderMap>;

    /// Build the pattern matching any of the given cache tags
    fn build_tag_pattern(&self, tags: &[&str]) -> Result<String>;

    /// Adjust the caller's headers for a refresh request
    fn prepare_refresh_headers(&self, _headers: &mut HeaderMap) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Purge.to_string(), "purge");
        assert_eq!(Operation::Refresh.to_string(), "refresh");
        assert_eq!(Operation::Ban.as_str(), "ban");
    }
}
