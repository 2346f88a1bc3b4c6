//! Transient, tab-scoped storage.
//!
//! Holds the only state expected to survive a reload within one session:
//! the live CSRF token and the last-activity timestamp. Wiped on teardown.

use dashmap::DashMap;

pub const CSRF_TOKEN_KEY: &str = "csrf_token";
pub const CSRF_ISSUED_AT_KEY: &str = "csrf_issued_at";
pub const LAST_ACTIVITY_KEY: &str = "session_last_activity";

/// Key/value storage scoped to one client session.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
    fn clear(&self);
}

/// In-memory storage; the default for hosts without a browser-like store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_operations() {
        let storage = MemoryStorage::new();
        assert!(storage.get(CSRF_TOKEN_KEY).is_none());

        storage.set(CSRF_TOKEN_KEY, "abc".to_string());
        storage.set(LAST_ACTIVITY_KEY, "42".to_string());
        assert_eq!(storage.get(CSRF_TOKEN_KEY).as_deref(), Some("abc"));
        assert_eq!(storage.len(), 2);

        storage.remove(CSRF_TOKEN_KEY);
        assert!(storage.get(CSRF_TOKEN_KEY).is_none());

        storage.clear();
        assert!(storage.is_empty());
    }
}
