//! Push message parsing

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors from the version channel
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Malformed push message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Push message has no numeric latestEventId")]
    MissingVersion,

    #[error("Invalid push URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(rename = "latestEventId")]
    latest_event_id: Option<Value>,
}

/// Extract the version from a push message
///
/// Only `latestEventId` is required; other fields are ignored. The value must
/// be a non-negative integer.
pub fn parse_latest_version(text: &str) -> Result<u64, ChannelError> {
    let message: PushMessage = serde_json::from_str(text)?;
    message
        .latest_event_id
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or(ChannelError::MissingVersion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_message() {
        assert_eq!(parse_latest_version(r#"{"latestEventId": 42}"#).unwrap(), 42);
        assert_eq!(
            parse_latest_version(r#"{"latestEventId": 7, "source": "api"}"#).unwrap(),
            7
        );
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert!(matches!(
            parse_latest_version(r#"{"latestEventId": "42"}"#),
            Err(ChannelError::MissingVersion)
        ));
        assert!(matches!(
            parse_latest_version(r#"{"latestEventId": -1}"#),
            Err(ChannelError::MissingVersion)
        ));
        assert!(matches!(
            parse_latest_version(r#"{"latestEventId": 1.5}"#),
            Err(ChannelError::MissingVersion)
        ));
        assert!(matches!(
            parse_latest_version(r#"{"other": 1}"#),
            Err(ChannelError::MissingVersion)
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_latest_version("heyhihello"), Err(ChannelError::Malformed(_))));
        assert!(matches!(parse_latest_version("[1, 2]"), Err(ChannelError::Malformed(_))));
    }
}
