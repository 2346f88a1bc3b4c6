//! CSRF token lifecycle.
//!
//! # States
//! ```text
//! NoToken → Issued → (Revalidated | Invalidated)
//! ```
//! Exactly one live token exists at a time. `issue()` and `adopt()` replace
//! it, `clear()` invalidates it. The live token is mirrored into session
//! storage so it survives a reload within the same session.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::observability::metrics;
use crate::session::storage::{SessionStorage, CSRF_ISSUED_AT_KEY, CSRF_TOKEN_KEY};

const TOKEN_BYTES: usize = 32;
pub const DEFAULT_HEADER: &str = "x-csrf-token";

/// An anti-forgery token: 64 lower-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    pub value: String,
    pub issued_at: u64,
}

/// Owns the session's single live token.
pub struct CsrfManager {
    live: Mutex<Option<CsrfToken>>,
    header_name: HeaderName,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn SessionStorage>,
}

impl CsrfManager {
    pub fn new(
        header_name: HeaderName,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        Self {
            live: Mutex::new(None),
            header_name,
            clock,
            storage,
        }
    }

    /// Create a manager, adopting a well-formed token left in storage.
    pub fn restore(
        header_name: HeaderName,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let manager = Self::new(header_name, clock, storage);
        if let Some(value) = manager.storage.get(CSRF_TOKEN_KEY) {
            if is_well_formed(&value) {
                let issued_at = manager
                    .storage
                    .get(CSRF_ISSUED_AT_KEY)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| manager.clock.now_millis());
                *manager.live.lock() = Some(CsrfToken { value, issued_at });
                tracing::debug!("restored CSRF token from session storage");
            } else {
                manager.storage.remove(CSRF_TOKEN_KEY);
                manager.storage.remove(CSRF_ISSUED_AT_KEY);
            }
        }
        manager
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// Generate a fresh token, replacing any live one.
    pub fn issue(&self) -> CsrfToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = self.install(hex::encode(bytes));
        metrics::record_token_issued("issued");
        tracing::debug!("issued new CSRF token");
        token
    }

    /// Install a token rotated by the server. Malformed values are ignored.
    pub fn adopt(&self, value: &str) -> bool {
        let value = value.trim();
        if !is_well_formed(value) {
            tracing::warn!("ignoring malformed rotated CSRF token");
            return false;
        }
        self.install(value.to_ascii_lowercase());
        metrics::record_token_issued("rotated");
        tracing::debug!("adopted rotated CSRF token");
        true
    }

    pub fn current_token(&self) -> Option<CsrfToken> {
        self.live.lock().clone()
    }

    /// True iff a live token exists and `candidate` equals it.
    pub fn validate(&self, candidate: &str) -> bool {
        match self.live.lock().as_ref() {
            Some(token) => token.value.as_bytes().ct_eq(candidate.as_bytes()).into(),
            None => false,
        }
    }

    /// Add the live token to `headers`. No-op when no token is live.
    pub fn attach_to_request_headers(&self, mut headers: HeaderMap) -> HeaderMap {
        if let Some(token) = self.current_token() {
            if let Ok(value) = HeaderValue::from_str(&token.value) {
                headers.insert(self.header_name.clone(), value);
            }
        }
        headers
    }

    /// Invalidate the live token and its stored copy.
    pub fn clear(&self) {
        *self.live.lock() = None;
        self.storage.remove(CSRF_TOKEN_KEY);
        self.storage.remove(CSRF_ISSUED_AT_KEY);
    }

    fn install(&self, value: String) -> CsrfToken {
        let token = CsrfToken {
            value,
            issued_at: self.clock.now_millis(),
        };
        let mut live = self.live.lock();
        self.storage.set(CSRF_TOKEN_KEY, token.value.clone());
        self.storage
            .set(CSRF_ISSUED_AT_KEY, token.issued_at.to_string());
        *live = Some(token.clone());
        token
    }
}

fn is_well_formed(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}
