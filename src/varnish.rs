//! Varnish flavored invalidation
//!
//! Varnish is expected to run a VCL that understands:
//! - `PURGE <url>` to drop a single object,
//! - a plain `GET` with `Cache-Control: no-cache` to refresh one,
//! - `BAN /` with `X-Host`, `X-Url` and `X-Content-Type` regex headers to ban
//!   every object matching all three patterns.

use crate::error::{InvalidationError, Result};
use crate::protocol::{Operation, ProxyProtocol};
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use http::HeaderMap;

pub const HEADER_HOST: HeaderName = HeaderName::from_static("x-host");
pub const HEADER_URL: HeaderName = HeaderName::from_static("x-url");
pub const HEADER_CONTENT_TYPE: HeaderName = HeaderName::from_static("x-content-type");

/// Pattern matching any value
pub const MATCH_ANY: &str = ".*";

/// Varnish caching proxy protocol
#[derive(Debug, Clone, Default)]
pub struct Varnish;

impl Varnish {
    pub fn new() -> Self {
        Varnish
    }
}

impl ProxyProtocol for Varnish {
    fn name(&self) -> &'static str {
        "Varnish"
    }

    fn allowed_schemes(&self) -> &[&'static str] {
        &["http"]
    }

    fn method(&self, operation: Operation) -> &'static str {
        match operation {
            Operation::Purge => "PURGE",
            Operation::Refresh => "GET",
            Operation::Ban => "BAN",
        }
    }

    fn default_ban_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in [HEADER_HOST, HEADER_URL, HEADER_CONTENT_TYPE] {
            headers.insert(name, HeaderValue::from_static(MATCH_ANY));
        }
        headers
    }

    fn build_ban_headers(
        &self,
        path_pattern: &str,
        content_type: Option<&str>,
        hosts: Option<&[&str]>,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(HEADER_URL, pattern_value(&HEADER_URL, path_pattern)?);

        if let Some(content_type) = content_type {
            headers.insert(
                HEADER_CONTENT_TYPE,
                pattern_value(&HEADER_CONTENT_TYPE, content_type)?,
            );
        }

        if let Some(hosts) = hosts {
            if hosts.is_empty() {
                return Err(InvalidationError::InvalidArgument(
                    "Either supply a list of hosts or omit the hosts argument".to_string(),
                ));
            }
            let pattern = format!("^({})$", hosts.join("|"));
            headers.insert(HEADER_HOST, pattern_value(&HEADER_HOST, &pattern)?);
        }

        Ok(headers)
    }

    fn build_tag_pattern(&self, tags: &[&str]) -> Result<String> {
        if tags.is_empty() {
            return Err(InvalidationError::InvalidArgument(
                "at least one tag is required".to_string(),
            ));
        }

        let escaped: Vec<String> = tags.iter().map(|tag| escape_pattern(tag)).collect();
        Ok(format!("({})(,.+)?$", escaped.join("|")))
    }

    fn prepare_refresh_headers(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(CACHE_CONTROL) {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
    }
}

fn pattern_value(name: &HeaderName, pattern: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(pattern).map_err(|e| {
        InvalidationError::InvalidArgument(format!(
            "pattern {:?} cannot be sent in {}: {}",
            pattern, name, e
        ))
    })
}

/// Escape PCRE metacharacters so `value` matches literally in a VCL regex
pub fn escape_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(
            c,
            '.' | '\\'
                | '+'
                | '*'
                | '?'
                | '['
                | '^'
                | ']'
                | '$'
                | '('
                | ')'
                | '{'
                | '}'
                | '='
                | '!'
                | '<'
                | '>'
                | '|'
                | ':'
                | '-'
                | '#'
                | '/'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
