//! Error types for cache invalidation

use crate::failure::AggregateInvalidationError;
use crate::protocol::Operation;
use thiserror::Error;

/// Result type alias for invalidation operations
pub type Result<T> = std::result::Result<T, InvalidationError>;

/// Error types that can occur while queuing or flushing invalidations
#[derive(Error, Debug, Clone)]
pub enum InvalidationError {
    #[error("{message}")]
    InvalidUrl { url: String, message: String },

    #[error(
        "Path \"{0}\" cannot be invalidated without a host. Either invalidate full URLs \
         containing hostname instead of paths or configure the caching proxy class \
         with a hostname in the base path."
    )]
    MissingHost(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Caching proxy {proxy} does not support {operation} operations")]
    UnsupportedOperation {
        proxy: &'static str,
        operation: Operation,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error(transparent)]
    Proxy(#[from] AggregateInvalidationError),
}

impl InvalidationError {
    /// URL could not be parsed at all
    pub fn invalid_url(url: impl Into<String>, reason: Option<&str>) -> Self {
        let url = url.into();
        let mut message = format!("URL \"{}\" is invalid.", url);
        if let Some(reason) = reason {
            message.push_str(&format!(" Reason: {}.", reason));
        }
        InvalidationError::InvalidUrl { url, message }
    }

    /// URL carries a scheme the caching proxy cannot speak
    pub fn invalid_url_scheme(url: impl Into<String>, scheme: &str, allowed: &[&str]) -> Self {
        let url = url.into();
        let allowed = allowed
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "Host \"{}\" with scheme \"{}\" is invalid. Only the following schemes are allowed: {}",
            url, scheme, allowed
        );
        InvalidationError::InvalidUrl { url, message }
    }

    /// URL contains parts (path, query, ...) that are not allowed
    pub fn invalid_url_parts(url: impl Into<String>, allowed_parts: &[&str]) -> Self {
        let url = url.into();
        let message = format!(
            "Server \"{}\" is invalid. Only {} URL parts are allowed",
            url,
            allowed_parts.join(", ")
        );
        InvalidationError::InvalidUrl { url, message }
    }

    /// Whether the error was raised while configuring or queuing, before any
    /// request left the process
    pub fn is_configuration_error(&self) -> bool {
        match self {
            InvalidationError::InvalidUrl { .. } => true,
            InvalidationError::MissingHost(_) => true,
            InvalidationError::InvalidArgument(_) => true,
            InvalidationError::UnsupportedOperation { .. } => true,
            InvalidationError::ConfigError(_) => true,
            InvalidationError::HttpError(_) => true,
            InvalidationError::Proxy(_) => false,
        }
    }

    /// The per-server failures of a flush, if this is a dispatch error
    pub fn proxy_failures(&self) -> Option<&AggregateInvalidationError> {
        match self {
            InvalidationError::Proxy(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}
