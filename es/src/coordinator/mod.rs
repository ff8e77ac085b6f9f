//! Refresh Coordinator
//!
//! The Coordinator owns the authoritative version ("event id"), the registry
//! of observers and the single-flight refresh cycle:
//! - **update_version:** adopt a strictly newer version, refresh if idle
//! - **register / unregister:** manage observers, refresh if idle
//! - **cycle:** fetch for a snapshot of observers, deliver, then refresh again
//!   if anything changed in the meantime

mod config;
mod core;
mod handle;
mod messages;
mod observer;
mod state;

pub use config::CoordinatorConfig;
pub use self::core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CoordinatorError, CoordinatorMetrics};
pub use observer::{FetchError, FetchResult, FnObserver, Observer, ObserverId};
