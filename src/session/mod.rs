//! Session lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! UI interaction
//!     → activity.rs (ActivityHub dispatches the signal)
//!     → monitor.rs (refresh last_activity)
//!
//! Every check interval:
//!     monitor.rs compares now - last_activity with the idle timeout
//!     → on breach: stop monitoring, clear CSRF + rate limits + storage
//!     → broadcast SessionEvent::Expired to the UI
//! ```
//!
//! # Design Decisions
//! - Listeners hold weak references; dropping the monitor releases them
//! - Teardown happens at most once per monitoring run
//! - Only tab-scoped storage is used, nothing persistent

pub mod activity;
pub mod monitor;
pub mod storage;

pub use activity::{ActivityHub, ActivityListener, ActivitySignal, ListenerId};
pub use monitor::{SessionEvent, SessionMonitor};
pub use storage::{MemoryStorage, SessionStorage};
