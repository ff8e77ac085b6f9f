//! Observer trait and the values that flow through a refresh cycle

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Data returned by one observer's fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Version the server answered for
    pub version: u64,

    /// View payload at that version
    pub payload: Value,
}

impl FetchResult {
    pub fn new(version: u64, payload: Value) -> Self {
        Self { version, payload }
    }
}

/// Errors an observer's fetch resolves to
///
/// A failed fetch only affects its own observer: the coordinator delivers an
/// absent payload to that observer and carries on with the rest.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch failed: {0}")]
    Failed(String),

    #[error("Fetch task panicked: {0}")]
    Panicked(String),
}

/// Unique handle for a registered observer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(String);

impl ObserverId {
    pub(crate) fn from_counter(n: u64) -> Self {
        Self(format!("observer {}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A consumer interested in view data at the current version
///
/// `fetch` runs concurrently with the other participants of a cycle and must
/// resolve (never hang on purpose); `on_settled` is called from the
/// coordinator task at most once per cycle and must not block.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Retrieve data for `version` (`None` on a cold-start cycle)
    async fn fetch(&self, version: Option<u64>) -> Result<FetchResult, FetchError>;

    /// Receive the outcome of a cycle; `payload` is `None` when the fetch failed
    fn on_settled(&self, version: Option<u64>, payload: Option<Value>);
}

/// Observer built from a fetch closure and a settle closure
pub struct FnObserver<F, S> {
    fetch: F,
    settle: S,
}

impl<F, S> FnObserver<F, S> {
    pub fn new(fetch: F, settle: S) -> Self {
        Self { fetch, settle }
    }
}

#[async_trait]
impl<F, Fut, S> Observer for FnObserver<F, S>
where
    F: Fn(Option<u64>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FetchResult, FetchError>> + Send + 'static,
    S: Fn(Option<u64>, Option<Value>) + Send + Sync,
{
    async fn fetch(&self, version: Option<u64>) -> Result<FetchResult, FetchError> {
        (self.fetch)(version).await
    }

    fn on_settled(&self, version: Option<u64>, payload: Option<Value>) {
        (self.settle)(version, payload)
    }
}

impl fmt::Debug for dyn Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Observer")
    }
}

/// Registry entry: an observer and its handle
#[derive(Debug, Clone)]
pub(crate) struct Registered {
    pub id: ObserverId,
    pub observer: Arc<dyn Observer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_observer_id_format() {
        let id = ObserverId::from_counter(3);
        assert_eq!(id.as_str(), "observer 3");
        assert_eq!(id.to_string(), "observer 3");
    }

    #[tokio::test]
    async fn test_fn_observer_forwards_calls() {
        let settled = Arc::new(Mutex::new(Vec::new()));
        let sink = settled.clone();
        let observer = FnObserver::new(
            |version: Option<u64>| async move { Ok(FetchResult::new(version.unwrap_or(1), json!("x"))) },
            move |version, payload| sink.lock().unwrap().push((version, payload)),
        );

        let result = observer.fetch(Some(9)).await.unwrap();
        assert_eq!(result, FetchResult::new(9, json!("x")));

        observer.on_settled(Some(9), None);
        assert_eq!(settled.lock().unwrap().as_slice(), &[(Some(9), None)]);
    }
}
