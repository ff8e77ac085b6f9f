//! VersionChannel - WebSocket listener feeding the Coordinator

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::message::{ChannelError, parse_latest_version};
use crate::config::{ChannelConfig, is_local_host};
use crate::coordinator::CoordinatorHandle;

/// Counters reported when the channel closes
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelSummary {
    pub messages_received: u64,
    pub versions_accepted: u64,
    pub discarded: u64,
}

/// Build the push endpoint URL for `host`
///
/// Local hosts use plain `ws://`, everything else `wss://`.
pub fn push_url(host: &str, publishable_key: &str) -> Result<Url, ChannelError> {
    let scheme = if is_local_host(host) { "ws" } else { "wss" };
    let mut url =
        Url::parse(&format!("{}://{}", scheme, host)).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut().append_pair("authKey", publishable_key);
    Ok(url)
}

/// Live connection that raises pushed versions to the Coordinator
///
/// The channel does not reconnect: [`VersionChannel::run`] returns once the
/// server closes the connection or the transport fails.
pub struct VersionChannel {
    url: Url,
    greeting: Option<String>,
    coordinator: CoordinatorHandle,
}

impl VersionChannel {
    pub fn new(url: Url, coordinator: CoordinatorHandle) -> Self {
        debug!(%url, "VersionChannel::new: called");
        Self {
            url,
            greeting: None,
            coordinator,
        }
    }

    /// Create a channel for `host` using the channel configuration
    pub fn from_config(
        host: &str,
        publishable_key: &str,
        config: &ChannelConfig,
        coordinator: CoordinatorHandle,
    ) -> Result<Self, ChannelError> {
        let url = push_url(host, publishable_key)?;
        Ok(Self::new(url, coordinator).with_greeting(config.greeting.clone()))
    }

    /// Text frame sent right after the connection opens
    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Run the channel on its own task
    pub fn spawn(self) -> JoinHandle<Result<ChannelSummary, ChannelError>> {
        tokio::spawn(self.run())
    }

    /// Connect and process push messages until the connection ends
    pub async fn run(self) -> Result<ChannelSummary, ChannelError> {
        debug!(url = %self.url, "VersionChannel::run: connecting");
        let (ws, response) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, status = %response.status(), "Version channel open");

        let (mut write, mut read) = ws.split();

        if let Some(greeting) = &self.greeting {
            debug!(%greeting, "VersionChannel::run: sending greeting");
            write.send(Message::Text(greeting.clone().into())).await?;
        }

        let mut summary = ChannelSummary::default();

        while let Some(next) = read.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Version channel error");
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    summary.messages_received += 1;
                    let version = match parse_latest_version(text.as_str()) {
                        Ok(version) => version,
                        Err(e) => {
                            summary.discarded += 1;
                            debug!(error = %e, "Discarding push message");
                            continue;
                        }
                    };

                    match self.coordinator.update_version(version).await {
                        Ok(true) => {
                            info!(version, "Updated version from push channel");
                            summary.versions_accepted += 1;
                        }
                        Ok(false) => debug!(version, "Pushed version is not newer"),
                        Err(e) => {
                            warn!(error = %e, "Coordinator unavailable, leaving version channel");
                            break;
                        }
                    }
                }
                Message::Binary(bytes) => {
                    summary.messages_received += 1;
                    summary.discarded += 1;
                    debug!(len = bytes.len(), "Ignoring binary push message");
                }
                Message::Close(frame) => {
                    info!(?frame, "Version channel closed");
                    break;
                }
                _ => {}
            }
        }

        info!(?summary, "Version channel finished");
        Ok(summary)
    }
}
