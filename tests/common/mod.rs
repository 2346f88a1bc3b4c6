//! Shared utilities for integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{json, Value};

use secure_gate::config::{GuardConfig, RateLimitRule};
use secure_gate::gate::{OutboundRequest, Transport, TransportFailure, TransportResponse};
use secure_gate::session::{ActivityHub, MemoryStorage};
use secure_gate::{ManualClock, SecureGate};

#[allow(dead_code)]
pub const START_MS: u64 = 1_700_000_000_000;

/// What the mock transport does with the next request.
#[derive(Clone)]
#[allow(dead_code)]
pub enum Reply {
    Status(u16, Value),
    Rotate(String),
    Fail(String),
}

/// Transport that records every request and answers from a script.
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundRequest>>,
    reply: Mutex<Reply>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply::Status(200, json!({ "ok": true }))),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportFailure> {
        self.sent.lock().push(request);
        match self.reply.lock().clone() {
            Reply::Status(status, body) => Ok(TransportResponse::new(status, body)),
            Reply::Rotate(token) => {
                let mut response = TransportResponse::new(200, json!({ "ok": true }));
                response.headers.insert(
                    HeaderName::from_static("x-csrf-token"),
                    HeaderValue::from_str(&token).map_err(|e| TransportFailure::Other(e.to_string()))?,
                );
                Ok(response)
            }
            Reply::Fail(message) => Err(TransportFailure::Other(message)),
        }
    }
}

#[allow(dead_code)]
/// A gate with `create-user` limited to 3 requests per second.
pub struct Harness {
    pub gate: SecureGate,
    pub clock: ManualClock,
    pub hub: Arc<ActivityHub>,
    pub storage: Arc<MemoryStorage>,
}

#[allow(dead_code)]
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.rate_limit.operations.insert(
        "create-user".to_string(),
        RateLimitRule {
            max_requests: 3,
            window_ms: 1_000,
        },
    );
    config
}

#[allow(dead_code)]
pub fn harness() -> Harness {
    harness_with(test_config())
}

#[allow(dead_code)]
pub fn harness_with(config: GuardConfig) -> Harness {
    let clock = ManualClock::new(START_MS);
    let hub = Arc::new(ActivityHub::new());
    let storage = Arc::new(MemoryStorage::new());
    let gate = SecureGate::new(
        config,
        Arc::new(clock.clone()),
        storage.clone(),
        hub.clone(),
    )
    .expect("test config is valid");
    Harness {
        gate,
        clock,
        hub,
        storage,
    }
}
