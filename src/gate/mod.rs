//! Secure request gate.
//!
//! # Data Flow
//! ```text
//! secure_request(operation, payload, transport)
//!     → session check (expired: teardown, SessionExpired)
//!     → rate limiter (RateLimited with reset time)
//!     → refresh activity
//!     → validate + sanitize every field (ValidationFailed)
//!     → attach CSRF token + x-request-id (MissingCsrfToken)
//!     → transport.send (Transport on failure or non-2xx)
//!     → adopt rotated CSRF token from the response
//! ```
//!
//! # Design Decisions
//! - Each step short-circuits; nothing reaches the transport unsanitized
//! - Limits are read from the config snapshot on every call (hot reload)
//! - Logs carry operation, request id, field names and kinds, never values

pub mod transport;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::validation::validate_config;
use crate::config::{shared, ConfigError, GuardConfig, SharedConfig};
use crate::errors::GateError;
use crate::observability::metrics;
use crate::security::csrf::{CsrfManager, CsrfToken, DEFAULT_HEADER};
use crate::security::field::{FieldRule, FieldType};
use crate::security::rate_limit::RateLimiter;
use crate::security::validation::validate_form;
use crate::session::activity::ActivityHub;
use crate::session::monitor::{SessionEvent, SessionMonitor};
use crate::session::storage::SessionStorage;

pub use transport::{
    OutboundRequest, ReqwestTransport, Transport, TransportFailure, TransportResponse,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Named field values plus the rule each one is checked against.
#[derive(Clone, Default)]
pub struct Payload {
    values: BTreeMap<String, String>,
    rules: BTreeMap<String, FieldRule>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: impl Into<String>, rule: FieldRule) -> Self {
        self.values.insert(name.to_string(), value.into());
        self.rules.insert(name.to_string(), rule);
        self
    }

    /// A field with no rule; checked as optional free text.
    pub fn value(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Field values never reach Debug output.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("fields", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Orchestrates validation, rate limiting, CSRF and session checks around
/// one outbound operation.
pub struct SecureGate {
    config: SharedConfig,
    storage: Arc<dyn SessionStorage>,
    csrf: Arc<CsrfManager>,
    limiter: Arc<RateLimiter>,
    monitor: SessionMonitor,
    rotation_header: HeaderName,
}

impl SecureGate {
    pub fn new(
        config: GuardConfig,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
        hub: Arc<ActivityHub>,
    ) -> Result<Self, ConfigError> {
        Self::with_shared_config(shared(config), clock, storage, hub)
    }

    /// Build on a hot-reloadable snapshot.
    ///
    /// Rate limits and the default field length follow reloads; header
    /// names and session timeouts are fixed here.
    pub fn with_shared_config(
        config: SharedConfig,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
        hub: Arc<ActivityHub>,
    ) -> Result<Self, ConfigError> {
        let snapshot = config.load_full();
        validate_config(&snapshot).map_err(ConfigError::Validation)?;

        let header_name = header_or_default(&snapshot.csrf.header_name);
        let rotation_header = header_or_default(&snapshot.csrf.rotation_header);

        let csrf = Arc::new(CsrfManager::restore(
            header_name,
            clock.clone(),
            storage.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        let monitor = SessionMonitor::new(
            &snapshot.session,
            clock,
            storage.clone(),
            hub,
            csrf.clone(),
            limiter.clone(),
        );

        Ok(Self {
            config,
            storage,
            csrf,
            limiter,
            monitor,
            rotation_header,
        })
    }

    pub fn csrf(&self) -> &CsrfManager {
        &self.csrf
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn session(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn config(&self) -> Arc<GuardConfig> {
        self.config.load_full()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.monitor.subscribe()
    }

    /// Start an authenticated session: fresh token, activity stamp, monitoring.
    pub fn login(&self) -> CsrfToken {
        // Stamp activity first so a pending idle check cannot wipe the new token.
        self.monitor.begin_session();
        let token = self.csrf.issue();
        self.monitor.start_monitoring();
        tracing::info!("session started");
        token
    }

    pub fn logout(&self) {
        self.monitor.stop_monitoring();
        self.monitor.clear_sensitive_data();
        self.storage.clear();
        tracing::info!("session ended");
    }

    /// Check a token echoed back by a form or server against the live one.
    pub fn verify_token(&self, candidate: &str) -> Result<(), GateError> {
        if self.csrf.current_token().is_none() {
            return Err(GateError::MissingCsrfToken);
        }
        if !self.csrf.validate(candidate) {
            tracing::warn!("CSRF token mismatch");
            return Err(GateError::TokenMismatch);
        }
        Ok(())
    }

    /// Run `operation` through every check, then hand it to `transport`.
    pub async fn secure_request<T: Transport + ?Sized>(
        &self,
        operation: &str,
        payload: &Payload,
        transport: &T,
    ) -> Result<TransportResponse, GateError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "secure_request",
            operation = %operation,
            request_id = %request_id
        );

        let result = self
            .dispatch(operation, &request_id, payload, transport)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_gate_outcome(operation, outcome);
        result
    }

    async fn dispatch<T: Transport + ?Sized>(
        &self,
        operation: &str,
        request_id: &str,
        payload: &Payload,
        transport: &T,
    ) -> Result<TransportResponse, GateError> {
        let config = self.config.load_full();

        if !self.monitor.is_session_valid() {
            tracing::warn!("rejecting request, session is not valid");
            self.monitor.expire();
            return Err(GateError::SessionExpired);
        }

        let rule = config.rate_limit.rule_for(operation);
        if !self
            .limiter
            .is_allowed(operation, rule.max_requests, rule.window_ms)
        {
            let reset_at_ms = self.limiter.get_reset_time(operation, rule.window_ms);
            metrics::record_rate_limited(operation);
            tracing::warn!(reset_at_ms, "rate limit exceeded");
            return Err(GateError::RateLimited {
                operation: operation.to_string(),
                reset_at_ms,
            });
        }

        self.monitor.update_activity();

        let max_len = config.validation.max_field_length;
        let mut rules: BTreeMap<String, FieldRule> = payload
            .rules
            .iter()
            .map(|(name, rule)| (name.clone(), rule.with_default_max(max_len)))
            .collect();
        for name in payload.values.keys() {
            rules
                .entry(name.clone())
                .or_insert_with(|| FieldRule::new(FieldType::FreeText).with_default_max(max_len));
        }

        let form = validate_form(&payload.values, &rules);
        if !form.is_valid {
            let errors = form.error_list();
            for error in &errors {
                metrics::record_validation_failure(error.kind);
            }
            tracing::info!(
                failed = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
                "payload failed validation"
            );
            return Err(GateError::ValidationFailed(errors));
        }

        if self.csrf.current_token().is_none() {
            tracing::warn!("no live CSRF token, refusing to send");
            return Err(GateError::MissingCsrfToken);
        }
        let mut headers = self.csrf.attach_to_request_headers(HeaderMap::new());
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        let request = OutboundRequest {
            operation: operation.to_string(),
            request_id: request_id.to_string(),
            payload: form.sanitized_data,
            headers,
        };

        let response = transport.send(request).await.map_err(|e| {
            tracing::error!(error = %e, "transport failed");
            GateError::Transport {
                status: None,
                message: e.to_string(),
            }
        })?;

        if !response.ok() {
            tracing::warn!(status = response.status, "server rejected request");
            return Err(GateError::Transport {
                status: Some(response.status),
                message: format!("server responded with status {}", response.status),
            });
        }

        if let Some(rotated) = response
            .headers
            .get(&self.rotation_header)
            .and_then(|v| v.to_str().ok())
        {
            if !self.csrf.validate(rotated) {
                self.csrf.adopt(rotated);
            }
        }

        tracing::debug!(status = response.status, "request completed");
        Ok(response)
    }
}

fn header_or_default(name: &str) -> HeaderName {
    HeaderName::from_bytes(name.as_bytes())
        .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_HEADER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RateLimitRule;
    use crate::errors::ErrorKind;
    use crate::session::storage::MemoryStorage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutboundRequest>>,
        status: u16,
        rotate_to: Option<String>,
    }

    impl Recorder {
        fn answering(status: u16) -> Self {
            Self {
                status,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(
            &self,
            request: OutboundRequest,
        ) -> Result<TransportResponse, TransportFailure> {
            self.sent.lock().push(request);
            let mut response = TransportResponse::new(self.status, json!({"id": 7}));
            if let Some(token) = &self.rotate_to {
                response
                    .headers
                    .insert(DEFAULT_HEADER, HeaderValue::from_str(token).unwrap());
            }
            Ok(response)
        }
    }

    fn gate() -> (SecureGate, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let mut config = GuardConfig::default();
        config.rate_limit.operations.insert(
            "create-user".to_string(),
            RateLimitRule {
                max_requests: 2,
                window_ms: 1_000,
            },
        );
        let gate = SecureGate::new(
            config,
            Arc::new(clock.clone()),
            Arc::new(MemoryStorage::new()),
            Arc::new(ActivityHub::new()),
        )
        .unwrap();
        (gate, clock)
    }

    fn user_payload() -> Payload {
        Payload::new()
            .field("name", "<b>Jo</b>hn", FieldRule::new(FieldType::Name).required())
            .field(
                "email",
                " JOHN@EXAMPLE.COM ",
                FieldRule::new(FieldType::Email).required(),
            )
    }

    #[tokio::test]
    async fn test_sanitized_payload_reaches_transport() {
        let (gate, _) = gate();
        let token = gate.login();
        let transport = Recorder::answering(201);

        let response = gate
            .secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap();
        assert_eq!(response.status, 201);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload["name"], "John");
        assert_eq!(sent[0].payload["email"], "john@example.com");
        assert_eq!(
            sent[0].headers.get(DEFAULT_HEADER).unwrap().to_str().unwrap(),
            token.value
        );
        assert!(sent[0].headers.contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_no_session_is_expired() {
        let (gate, _) = gate();
        let mut events = gate.subscribe();
        let transport = Recorder::answering(200);

        let err = gate
            .secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::SessionExpired);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_reports_reset_time() {
        let (gate, clock) = gate();
        gate.login();
        let transport = Recorder::answering(200);
        let start = clock.now_millis();

        for _ in 0..2 {
            gate.secure_request("create-user", &user_payload(), &transport)
                .await
                .unwrap();
            clock.advance(Duration::from_millis(100));
        }
        let err = gate
            .secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GateError::RateLimited {
                operation: "create-user".to_string(),
                reset_at_ms: start + 1_000,
            }
        );
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_lists_fields() {
        let (gate, _) = gate();
        gate.login();
        let transport = Recorder::answering(200);
        let payload = Payload::new()
            .field("email", "not-an-email", FieldRule::new(FieldType::Email).required())
            .field("name", "", FieldRule::new(FieldType::Name).required());

        let err = gate
            .secure_request("update-profile", &payload, &transport)
            .await
            .unwrap_err();
        match err {
            GateError::ValidationFailed(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["email", "name"]);
                assert_eq!(errors[1].kind, ErrorKind::MissingRequiredField);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_blocks_send() {
        let (gate, _) = gate();
        gate.login();
        gate.csrf().clear();
        let transport = Recorder::answering(200);

        let err = gate
            .secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::MissingCsrfToken);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let (gate, _) = gate();
        gate.login();
        let transport = Recorder::answering(503);

        let err = gate
            .secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert!(matches!(err, GateError::Transport { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_rotated_token_is_adopted() {
        let (gate, _) = gate();
        let old = gate.login();
        let rotated = "c".repeat(64);
        let transport = Recorder {
            status: 200,
            rotate_to: Some(rotated.clone()),
            ..Default::default()
        };

        gate.secure_request("create-user", &user_payload(), &transport)
            .await
            .unwrap();
        assert_eq!(gate.verify_token(&old.value), Err(GateError::TokenMismatch));
        assert_eq!(gate.verify_token(&rotated), Ok(()));
    }

    #[test]
    fn test_verify_token_without_session() {
        let (gate, _) = gate();
        assert_eq!(gate.verify_token("abc"), Err(GateError::MissingCsrfToken));
    }

    #[test]
    fn test_logout_clears_state() {
        let (gate, _) = gate();
        gate.login();
        assert!(gate.session().is_monitoring());

        gate.logout();
        assert!(!gate.session().is_monitoring());
        assert!(!gate.session().is_session_valid());
        assert!(gate.csrf().current_token().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GuardConfig::default();
        config.rate_limit.window_ms = 0;
        let result = SecureGate::new(
            config,
            Arc::new(ManualClock::new(0)),
            Arc::new(MemoryStorage::new()),
            Arc::new(ActivityHub::new()),
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_payload_debug_hides_values() {
        let payload = Payload::new().value("password", "hunter2");
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("password"));
        assert!(!rendered.contains("hunter2"));
    }
}
