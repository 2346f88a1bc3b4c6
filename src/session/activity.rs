//! User-interaction signal registration.
//!
//! The UI layer owns the real event sources and forwards them through
//! [`ActivityHub::emit`]. Consumers register callbacks per signal and get a
//! [`ListenerId`] back for deregistration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Interaction signals that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivitySignal {
    pub const ALL: [ActivitySignal; 6] = [
        ActivitySignal::PointerDown,
        ActivitySignal::PointerMove,
        ActivitySignal::KeyPress,
        ActivitySignal::Scroll,
        ActivitySignal::TouchStart,
        ActivitySignal::Click,
    ];
}

pub type ActivityListener = Arc<dyn Fn(ActivitySignal) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    signal: ActivitySignal,
    listener: ActivityListener,
}

/// In-process dispatcher for activity signals.
#[derive(Default)]
pub struct ActivityHub {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, signal: ActivitySignal, listener: ActivityListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration {
            id,
            signal,
            listener,
        });
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Deliver `signal` to its listeners. Returns how many were invoked.
    pub fn emit(&self, signal: ActivitySignal) -> usize {
        // Listeners run outside the lock so they may (de)register.
        let listeners: Vec<ActivityListener> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.signal == signal)
            .map(|r| r.listener.clone())
            .collect();
        for listener in &listeners {
            listener(signal);
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().len()
    }
}
