//! In-memory sender for tests
//!
//! [`RecordingSender`] records every request it is handed and answers from a
//! failure plan keyed by caching proxy host. Requests to hosts without a plan
//! succeed with `200 OK`.

use crate::models::{DispatchOutcome, DispatchRequest, FailedResponse, TransportFailure};
use crate::sender::HttpSender;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum PlannedFailure {
    Unreachable(String),
    Status(u16, String),
}

#[derive(Debug, Default)]
struct Recorded {
    requests: Vec<DispatchRequest>,
    batches: usize,
    failures: HashMap<String, PlannedFailure>,
}

/// Sender that records requests instead of sending them
#[derive(Debug, Default)]
pub struct RecordingSender {
    inner: Mutex<Recorded>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report requests to `host` as unreachable with `message`
    pub fn fail_unreachable(&self, host: &str, message: &str) {
        self.lock()
            .failures
            .insert(host.to_string(), PlannedFailure::Unreachable(message.to_string()));
    }

    /// Report requests to `host` as answered with an error status
    pub fn fail_with_status(&self, host: &str, status: u16, reason: &str) {
        self.lock()
            .failures
            .insert(host.to_string(), PlannedFailure::Status(status, reason.to_string()));
    }

    /// Let every request succeed again
    pub fn reset_failures(&self) {
        self.lock().failures.clear();
    }

    /// All requests received so far, in dispatch order
    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.lock().requests.clone()
    }

    /// Number of batches received so far
    pub fn batches(&self) -> usize {
        self.lock().batches
    }

    /// Forget recorded requests and batches
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.requests.clear();
        inner.batches = 0;
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HttpSender for RecordingSender {
    async fn send(&self, batch: Vec<DispatchRequest>) -> Vec<DispatchOutcome> {
        let mut inner = self.lock();
        inner.batches += 1;

        let mut outcomes = Vec::with_capacity(batch.len());
        for request in batch {
            let host = request.server_host();
            let outcome = match inner.failures.get(&host) {
                None => DispatchOutcome::Success {
                    status: 200,
                    reason: "OK".to_string(),
                },
                Some(PlannedFailure::Unreachable(message)) => {
                    DispatchOutcome::Failure(TransportFailure {
                        host,
                        message: message.clone(),
                        response: None,
                    })
                }
                Some(PlannedFailure::Status(status, reason)) => {
                    DispatchOutcome::Failure(TransportFailure {
                        host,
                        message: reason.clone(),
                        response: Some(FailedResponse {
                            status: *status,
                            reason: reason.clone(),
                        }),
                    })
                }
            };
            outcomes.push(outcome);
            inner.requests.push(request);
        }

        outcomes
    }
}
