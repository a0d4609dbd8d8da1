//! Classification and aggregation of per-server dispatch failures
//!
//! A flush fans out into one request per caching proxy server. Every failed
//! request is classified on its own and collected into one
//! [`AggregateInvalidationError`], so an unreachable server never hides the
//! errors reported by the others.

use crate::models::{DispatchOutcome, DispatchRequest, TransportFailure};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A caching proxy could not be reached at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Request to caching proxy at {host} failed with message \"{message}\"")]
pub struct ProxyUnreachableError {
    pub host: String,
    pub url: String,
    pub message: String,
}

/// A caching proxy answered with an error status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status} error response \"{reason}\" from caching proxy at {host}")]
pub struct ProxyResponseError {
    pub host: String,
    pub url: String,
    pub status: u16,
    pub reason: String,
}

/// One classified failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyFailure {
    #[error(transparent)]
    Unreachable(#[from] ProxyUnreachableError),

    #[error(transparent)]
    Response(#[from] ProxyResponseError),
}

impl ProxyFailure {
    /// Caching proxy `host[:port]` the failure is attributed to
    pub fn host(&self) -> &str {
        match self {
            ProxyFailure::Unreachable(e) => &e.host,
            ProxyFailure::Response(e) => &e.host,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ProxyFailure::Unreachable(e) => &e.url,
            ProxyFailure::Response(e) => &e.url,
        }
    }

    /// Label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyFailure::Unreachable(_) => "unreachable",
            ProxyFailure::Response(_) => "response",
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProxyFailure::Unreachable(_))
    }

    /// Classify a single transport failure
    ///
    /// No response means the proxy was never reached (connect error,
    /// timeout). A response means the proxy itself reported the error.
    pub fn classify(request: &DispatchRequest, failure: TransportFailure) -> Self {
        let host = if failure.host.is_empty() {
            request.server_host()
        } else {
            failure.host
        };

        match failure.response {
            None => ProxyFailure::Unreachable(ProxyUnreachableError {
                host,
                url: request.url.clone(),
                message: failure.message,
            }),
            Some(response) => ProxyFailure::Response(ProxyResponseError {
                host,
                url: request.url.clone(),
                status: response.status,
                reason: response.reason,
            }),
        }
    }
}

/// All failures of one flush, in the order they were encountered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateInvalidationError {
    failures: Vec<ProxyFailure>,
}

impl AggregateInvalidationError {
    pub fn new(failures: Vec<ProxyFailure>) -> Self {
        AggregateInvalidationError { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn first(&self) -> Option<&ProxyFailure> {
        self.failures.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProxyFailure> {
        self.failures.iter()
    }

    pub fn failures(&self) -> &[ProxyFailure] {
        &self.failures
    }

    /// Distinct hosts that had at least one failure
    pub fn failed_hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::new();
        for failure in &self.failures {
            if !hosts.contains(&failure.host()) {
                hosts.push(failure.host());
            }
        }
        hosts
    }

    pub(crate) fn push(&mut self, failure: ProxyFailure) {
        self.failures.push(failure);
    }
}

impl fmt::Display for AggregateInvalidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.len() {
            0 => write!(f, "No invalidation failures"),
            1 => write!(f, "1 invalidation request failed: {}", self.failures[0]),
            n => write!(
                f,
                "{} invalidation requests failed, first: {}",
                n, self.failures[0]
            ),
        }
    }
}

impl std::error::Error for AggregateInvalidationError {}

impl IntoIterator for AggregateInvalidationError {
    type Item = ProxyFailure;
    type IntoIter = std::vec::IntoIter<ProxyFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

impl<'a> IntoIterator for &'a AggregateInvalidationError {
    type Item = &'a ProxyFailure;
    type IntoIter = std::slice::Iter<'a, ProxyFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}

/// Turn a batch of outcomes into an aggregate failure
///
/// Outcomes correlate to `requests` by position. Requests without an outcome
/// count as unreachable. Returns `Ok(())` when every request succeeded.
pub fn classify(
    requests: &[DispatchRequest],
    outcomes: Vec<DispatchOutcome>,
) -> std::result::Result<(), AggregateInvalidationError> {
    let mut aggregate = AggregateInvalidationError::default();
    let mut outcomes = outcomes.into_iter();

    for request in requests {
        let failure = match outcomes.next() {
            Some(DispatchOutcome::Success { .. }) => continue,
            Some(DispatchOutcome::Failure(failure)) => ProxyFailure::classify(request, failure),
            None => ProxyFailure::Unreachable(ProxyUnreachableError {
                host: request.server_host(),
                url: request.url.clone(),
                message: "no outcome reported by sender".to_string(),
            }),
        };

        warn!("Invalidation {} {} failed: {}", request.method, request.url, failure);
        aggregate.push(failure);
    }

    if aggregate.is_empty() {
        Ok(())
    } else {
        Err(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailedResponse;
    use http::{HeaderMap, Method};

    fn request(url: &str) -> DispatchRequest {
        DispatchRequest {
            method: Method::from_bytes(b"PURGE").unwrap(),
            url: url.to_string(),
            headers: HeaderMap::new(),
        }
    }

    fn ok() -> DispatchOutcome {
        DispatchOutcome::Success {
            status: 200,
            reason: "OK".to_string(),
        }
    }

    fn unreachable(host: &str) -> DispatchOutcome {
        DispatchOutcome::Failure(TransportFailure {
            host: host.to_string(),
            message: "Couldn't connect to host".to_string(),
            response: None,
        })
    }

    fn forbidden(host: &str) -> DispatchOutcome {
        DispatchOutcome::Failure(TransportFailure {
            host: host.to_string(),
            message: "Forbidden".to_string(),
            response: Some(FailedResponse {
                status: 403,
                reason: "Forbidden".to_string(),
            }),
        })
    }

    #[test]
    fn test_all_success() {
        let requests = vec![request("http://127.0.0.1/a"), request("http://127.0.0.2/a")];
        assert!(classify(&requests, vec![ok(), ok()]).is_ok());
    }

    #[test]
    fn test_every_failure_collected() {
        let requests = vec![
            request("http://127.0.0.1/a"),
            request("http://127.0.0.2/a"),
            request("http://127.0.0.3/a"),
        ];
        let outcomes = vec![unreachable("127.0.0.1"), ok(), forbidden("127.0.0.3")];

        let aggregate = classify(&requests, outcomes).unwrap_err();
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.first().unwrap().is_unreachable());
        assert_eq!(aggregate.failed_hosts(), vec!["127.0.0.1", "127.0.0.3"]);

        let kinds: Vec<&str> = aggregate.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, vec!["unreachable", "response"]);
    }

    #[test]
    fn test_messages() {
        let requests = vec![request("http://127.0.0.1/a"), request("http://127.0.0.1/b")];
        let aggregate =
            classify(&requests, vec![unreachable("127.0.0.1"), forbidden("127.0.0.1")])
                .unwrap_err();

        let messages: Vec<String> = aggregate.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            messages[0],
            "Request to caching proxy at 127.0.0.1 failed with message \"Couldn't connect to host\""
        );
        assert_eq!(
            messages[1],
            "403 error response \"Forbidden\" from caching proxy at 127.0.0.1"
        );
        assert!(aggregate.to_string().starts_with("2 invalidation requests failed"));
    }

    #[test]
    fn test_missing_outcome_is_unreachable() {
        let requests = vec![request("http://127.0.0.1:6081/a"), request("http://127.0.0.2/a")];
        let aggregate = classify(&requests, vec![ok()]).unwrap_err();
        assert_eq!(aggregate.len(), 1);
        assert_eq!(aggregate.first().unwrap().host(), "127.0.0.2");
    }

    #[test]
    fn test_empty_host_falls_back_to_request_url() {
        let requests = vec![request("http://127.0.0.1:6081/a")];
        let aggregate = classify(&requests, vec![unreachable("")]).unwrap_err();
        assert_eq!(aggregate.first().unwrap().host(), "127.0.0.1:6081");
        assert_eq!(aggregate.first().unwrap().url(), "http://127.0.0.1:6081/a");
    }

    #[test]
    fn test_into_iter() {
        let requests = vec![request("http://127.0.0.1/a")];
        let aggregate = classify(&requests, vec![forbidden("127.0.0.1")]).unwrap_err();
        let failures: Vec<ProxyFailure> = aggregate.into_iter().collect();
        assert!(matches!(
            failures[0],
            ProxyFailure::Response(ProxyResponseError { status: 403, .. })
        ));
    }
}
