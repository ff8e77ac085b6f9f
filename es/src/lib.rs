//! eventsync - push-notified view refreshes
//!
//! Keeps a set of view observers consistent with the server's latest event
//! id. A push channel announces new event ids, API calls report the id they
//! produced, and a single-flight coordinator refetches every view at the
//! newest id it has seen.
//!
//! # Modules
//!
//! - [`coordinator`] - Version gate, observer registry and refresh cycles
//! - [`channel`] - WebSocket push channel feeding the coordinator
//! - [`client`] - HTTP client for views and API endpoints
//! - [`form`] - Multipart form encoding for API calls
//! - [`view`] - View subscriptions backed by `watch` channels
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod form;
pub mod view;

// Re-export commonly used types
pub use channel::{ChannelError, ChannelSummary, VersionChannel};
pub use client::{ApiClient, ClientError, InvokeOutcome, ViewRequest};
pub use config::Config;
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, CoordinatorMetrics, FetchError, FetchResult,
    FnObserver, Observer, ObserverId,
};
pub use form::{FormBody, FormPart};
pub use view::{ViewState, ViewSubscription};
