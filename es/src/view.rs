//! View subscriptions
//!
//! A [`ViewSubscription`] registers an observer that fetches one view
//! endpoint and publishes the settled result through a `watch` channel.

use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::{ApiClient, ViewRequest};
use crate::coordinator::{CoordinatorHandle, FetchError, FetchResult, Observer, ObserverId};

/// Latest known state of a subscribed view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    /// Payload of the last settled cycle; `None` before the first one or after a failed fetch
    pub data: Option<Value>,

    /// True while a fetch for this view is in flight
    pub is_loading: bool,

    /// Version the data belongs to
    pub event_id: Option<u64>,
}

/// Observer that fetches a view endpoint
struct ViewObserver {
    client: ApiClient,
    request: ViewRequest,
    state: watch::Sender<ViewState>,
}

#[async_trait]
impl Observer for ViewObserver {
    async fn fetch(&self, version: Option<u64>) -> std::result::Result<FetchResult, FetchError> {
        debug!(view = %self.request.view_endpoint_id, ?version, "ViewObserver::fetch: called");
        self.state.send_modify(|state| state.is_loading = true);

        self.client.fetch_view(&self.request, version).await.map_err(|e| {
            warn!(view = %self.request.view_endpoint_id, error = %e, "Error fetching view");
            FetchError::from(e)
        })
    }

    fn on_settled(&self, version: Option<u64>, payload: Option<Value>) {
        debug!(view = %self.request.view_endpoint_id, ?version, "ViewObserver::on_settled: called");
        self.state.send_modify(|state| {
            state.event_id = version;
            state.is_loading = false;
            state.data = payload;
        });
    }
}

/// Registered view observer and its state stream
///
/// Dropping the subscription unregisters the observer on a best-effort basis;
/// call [`ViewSubscription::unsubscribe`] to wait for it.
pub struct ViewSubscription {
    id: ObserverId,
    coordinator: CoordinatorHandle,
    rx: watch::Receiver<ViewState>,
    active: bool,
}

impl ViewSubscription {
    /// Register an observer for `request` and start receiving its state
    pub async fn subscribe(coordinator: &CoordinatorHandle, client: ApiClient, request: ViewRequest) -> Result<Self> {
        debug!(view = %request.view_endpoint_id, "ViewSubscription::subscribe: called");
        let (tx, rx) = watch::channel(ViewState::default());

        let observer = ViewObserver {
            client,
            request,
            state: tx,
        };
        let id = coordinator.register(Arc::new(observer)).await?;

        Ok(Self {
            id,
            coordinator: coordinator.clone(),
            rx,
            active: true,
        })
    }

    pub fn id(&self) -> &ObserverId {
        &self.id
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ViewState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change and return it
    pub async fn changed(&mut self) -> Result<ViewState> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Unregister the observer
    pub async fn unsubscribe(mut self) -> Result<()> {
        debug!(observer = %self.id, "ViewSubscription::unsubscribe: called");
        self.active = false;
        self.coordinator.unregister(&self.id).await
    }
}

impl Drop for ViewSubscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Err(e) = self.coordinator.try_unregister(&self.id) else {
            return;
        };
        if self.coordinator.is_closed() {
            debug!(observer = %self.id, "ViewSubscription::drop: coordinator already stopped");
            return;
        }

        // Request channel is full: wait for capacity on a task instead
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(observer = %self.id, error = %e, "Coordinator busy, unregistering in the background");
                let coordinator = self.coordinator.clone();
                let id = self.id.clone();
                runtime.spawn(async move {
                    if let Err(e) = coordinator.unregister(&id).await {
                        warn!(observer = %id, error = %e, "Background unregister failed");
                    }
                });
            }
            Err(_) => warn!(observer = %self.id, error = %e, "Observer left registered: no runtime to unregister from"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig};
    use std::time::Duration;

    fn unreachable_client() -> ApiClient {
        // Bind then drop so nothing listens on the port
        let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        ApiClient::new(&addr.to_string(), "pk_test", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_on_settled_updates_state() {
        let (tx, rx) = watch::channel(ViewState {
            is_loading: true,
            ..Default::default()
        });
        let observer = ViewObserver {
            client: unreachable_client(),
            request: ViewRequest::new("view_1"),
            state: tx,
        };

        observer.on_settled(Some(4), Some(serde_json::json!({"n": 1})));

        assert_eq!(
            *rx.borrow(),
            ViewState {
                data: Some(serde_json::json!({"n": 1})),
                is_loading: false,
                event_id: Some(4),
            }
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_settles_without_data() {
        let coordinator = Coordinator::spawn(CoordinatorConfig::default());
        let mut sub = ViewSubscription::subscribe(&coordinator, unreachable_client(), ViewRequest::new("view_1"))
            .await
            .unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let state = sub.changed().await.unwrap();
                if !state.is_loading {
                    return state;
                }
            }
        })
        .await
        .unwrap();

        assert!(settled.data.is_none());
        assert!(settled.event_id.is_none());

        let metrics = coordinator.metrics().await.unwrap();
        assert_eq!(metrics.registered_observers, 1);
        assert_eq!(metrics.fetch_failures, 1);

        sub.unsubscribe().await.unwrap();
        let metrics = coordinator.metrics().await.unwrap();
        assert_eq!(metrics.registered_observers, 0);
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let coordinator = Coordinator::spawn(CoordinatorConfig {
            cold_start_fetch: false,
            ..Default::default()
        });
        let sub = ViewSubscription::subscribe(&coordinator, unreachable_client(), ViewRequest::new("view_1"))
            .await
            .unwrap();
        assert_eq!(coordinator.metrics().await.unwrap().registered_observers, 1);

        drop(sub);

        assert_eq!(coordinator.metrics().await.unwrap().registered_observers, 0);
    }

    #[tokio::test]
    async fn test_drop_with_full_channel_still_unregisters() {
        let coordinator = Coordinator::new(CoordinatorConfig {
            channel_buffer: 1,
            cold_start_fetch: false,
        });
        let handle = coordinator.handle();

        let (tx, rx) = watch::channel(ViewState::default());
        let observer = Arc::new(ViewObserver {
            client: unreachable_client(),
            request: ViewRequest::new("view_1"),
            state: tx,
        });

        // The pending registration takes the only slot in the request channel
        let registering = tokio::spawn({
            let handle = handle.clone();
            async move { handle.register(observer).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sub = ViewSubscription {
            id: ObserverId::from_counter(1),
            coordinator: handle.clone(),
            rx,
            active: true,
        };
        drop(sub);

        tokio::spawn(coordinator.run());
        assert_eq!(registering.await.unwrap().unwrap(), ObserverId::from_counter(1));

        let registered = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let metrics = handle.metrics().await.unwrap();
                if metrics.registered_observers == 0 {
                    return metrics.registered_observers;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Observer should be unregistered once the channel drains");
        assert_eq!(registered, 0);
    }
}
