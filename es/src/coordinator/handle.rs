//! CoordinatorHandle - client interface for observers and version sources

use std::future::Future;
use std::sync::Arc;

use eyre::{Result, eyre};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, CoordinatorMetrics};
use super::observer::{FetchError, FetchResult, FnObserver, Observer, ObserverId};

/// Handle for interacting with the Coordinator
///
/// This handle is cloneable and can be passed to every component that
/// registers observers or learns about new versions. All operations are
/// async and non-blocking.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>) -> Self {
        Self { tx }
    }

    /// Register an observer
    ///
    /// Starts a refresh cycle right away unless one is already running, in
    /// which case the observer is picked up by the follow-up cycle.
    pub async fn register(&self, observer: Arc<dyn Observer>) -> Result<ObserverId> {
        debug!("CoordinatorHandle::register: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::Register { observer, reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Register a fetch closure and a settle closure as one observer
    pub async fn register_fn<F, Fut, S>(&self, fetch: F, on_settled: S) -> Result<ObserverId>
    where
        F: Fn(Option<u64>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<FetchResult, FetchError>> + Send + 'static,
        S: Fn(Option<u64>, Option<Value>) + Send + Sync + 'static,
    {
        self.register(Arc::new(FnObserver::new(fetch, on_settled))).await
    }

    /// Remove an observer
    ///
    /// Fetches already dispatched for it still run, but their results are
    /// not delivered.
    pub async fn unregister(&self, id: &ObserverId) -> Result<()> {
        debug!(observer = %id, "CoordinatorHandle::unregister: called");
        self.tx
            .send(CoordRequest::Unregister { id: id.clone() })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        debug!("CoordinatorHandle::unregister: sent");
        Ok(())
    }

    /// Remove an observer without waiting for channel capacity (for `Drop`)
    pub fn try_unregister(&self, id: &ObserverId) -> Result<()> {
        debug!(observer = %id, "CoordinatorHandle::try_unregister: called");
        self.tx
            .try_send(CoordRequest::Unregister { id: id.clone() })
            .map_err(|e| eyre!("Could not queue unregister: {}", e))
    }

    /// Offer a candidate version
    ///
    /// Returns true when the candidate was newer than anything seen so far.
    pub async fn update_version(&self, candidate: u64) -> Result<bool> {
        debug!(candidate, "CoordinatorHandle::update_version: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::UpdateVersion { candidate, reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Get the current version, if one is known
    pub async fn current_version(&self) -> Result<Option<u64>> {
        debug!("CoordinatorHandle::current_version: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::CurrentVersion { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!("CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        debug!("CoordinatorHandle::metrics: waiting for reply");
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Request shutdown of the Coordinator
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Whether the Coordinator task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
