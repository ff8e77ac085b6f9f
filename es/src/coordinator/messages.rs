//! Message types for the Coordinator

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::observer::{FetchError, FetchResult, Observer, ObserverId};
use super::state::CyclePlan;

/// Consistency faults detected while reconciling a refresh cycle
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Got {actual} fetch results for {expected} participants")]
    ResultCountMismatch { expected: usize, actual: usize },
}

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub(crate) enum CoordRequest {
    /// Add an observer to the registry
    Register {
        observer: Arc<dyn Observer>,
        reply_tx: oneshot::Sender<ObserverId>,
    },

    /// Remove an observer from the registry
    Unregister { id: ObserverId },

    /// Offer a candidate version
    UpdateVersion {
        candidate: u64,
        reply_tx: oneshot::Sender<bool>,
    },

    /// All fetches of a cycle have settled (internal)
    CycleComplete {
        plan: CyclePlan,
        results: Vec<Result<FetchResult, FetchError>>,
    },

    /// Read the current version
    CurrentVersion {
        reply_tx: oneshot::Sender<Option<u64>>,
    },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorMetrics {
    pub current_version: Option<u64>,
    pub refreshing: bool,
    pub registered_observers: usize,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub fetch_failures: u64,
    pub versions_accepted: u64,
    pub versions_rejected: u64,
    /// Cycle starts attempted while another cycle was running
    pub reentrant_cycle_attempts: u64,
    /// Cycles whose result count did not match the participant count
    pub consistency_faults: u64,
    /// Settle callbacks that panicked
    pub settle_panics: u64,
}
