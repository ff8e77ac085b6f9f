//! Version Channel
//!
//! Listens on the push endpoint for `{"latestEventId": n}` messages and
//! offers each version to the Coordinator. Malformed messages are dropped.

mod message;
mod version_channel;

pub use message::{ChannelError, parse_latest_version};
pub use version_channel::{ChannelSummary, VersionChannel, push_url};
