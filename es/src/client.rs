//! HTTP client for view endpoints and API endpoints
//!
//! Thin wire layer: builds URLs, attaches the bearer credential and decodes
//! the `{success, data, error}` envelopes. Version bookkeeping stays in the
//! coordinator; the only coupling is that a successful API call reporting an
//! event id is offered to it.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ServerConfig, is_local_host};
use crate::coordinator::{CoordinatorHandle, FetchError, FetchResult};
use crate::form::FormBody;

/// Errors from HTTP calls
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ClientError> for FetchError {
    fn from(e: ClientError) -> Self {
        FetchError::Failed(e.to_string())
    }
}

/// Which view to fetch and with what access parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewRequest {
    pub view_endpoint_id: String,
    pub key: Option<String>,
    pub auth_key: Option<String>,
}

impl ViewRequest {
    pub fn new(view_endpoint_id: impl Into<String>) -> Self {
        Self {
            view_endpoint_id: view_endpoint_id.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    pub fn with_auth_key(mut self, auth_key: Option<String>) -> Self {
        self.auth_key = auth_key;
        self
    }
}

/// Outcome of an API endpoint call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokeOutcome {
    Success { event_id: Option<u64>, output: Value },
    Failure { error: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: Option<bool>,
    data: Option<EnvelopeData>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(rename = "eventId")]
    event_id: Option<u64>,
    #[serde(default)]
    output: Value,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    message: String,
}

/// Decode a view response body
///
/// Views answer `{"data": {"eventId": n, "output": ...}}`.
pub fn parse_view_body(body: &str) -> Result<FetchResult, ClientError> {
    let envelope: Envelope = serde_json::from_str(body)?;

    if envelope.success == Some(false) {
        let message = envelope.error.map(|e| e.message).unwrap_or_default();
        return Err(ClientError::InvalidResponse(format!("View request failed: {}", message)));
    }

    let data = envelope
        .data
        .ok_or_else(|| ClientError::InvalidResponse("View response has no data".to_string()))?;
    let version = data
        .event_id
        .ok_or_else(|| ClientError::InvalidResponse("View response has no eventId".to_string()))?;

    Ok(FetchResult::new(version, data.output))
}

/// Decode an API endpoint response body
pub fn parse_invoke_body(body: &str) -> Result<InvokeOutcome, ClientError> {
    let envelope: Envelope = serde_json::from_str(body)?;

    match (envelope.success, envelope.data) {
        (Some(true), Some(data)) => Ok(InvokeOutcome::Success {
            event_id: data.event_id,
            output: data.output,
        }),
        (Some(true), None) => Ok(InvokeOutcome::Success {
            event_id: None,
            output: Value::Null,
        }),
        (Some(false), _) => Ok(InvokeOutcome::Failure {
            error: envelope.error.map(|e| e.message).unwrap_or_default(),
        }),
        (None, _) => Err(ClientError::InvalidResponse("Response has no success flag".to_string())),
    }
}

/// Client for one server host
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    publishable_key: String,
}

impl ApiClient {
    /// Create a client for `host`
    ///
    /// Local hosts are reached over `http://`, everything else over `https://`.
    pub fn new(host: &str, publishable_key: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        debug!(%host, ?timeout, "ApiClient::new: called");
        let scheme = if is_local_host(host) { "http" } else { "https" };
        let base_url =
            Url::parse(&format!("{}://{}/", scheme, host)).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            publishable_key: publishable_key.into(),
        })
    }

    /// Create a client from server configuration
    pub fn from_config(config: &ServerConfig, publishable_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(&config.host, publishable_key, Duration::from_millis(config.timeout_ms))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of a view at `version`; empty parameters are left out
    pub fn view_url(&self, request: &ViewRequest, version: Option<u64>) -> Result<Url, ClientError> {
        let mut url = self.endpoint_url(&["view-endpoints", &request.view_endpoint_id, "view"])?;

        let version = version.map(|v| v.to_string());
        let params = [
            ("eventId", version.as_deref()),
            ("key", request.key.as_deref()),
            ("authKey", request.auth_key.as_deref()),
        ];
        let present: Vec<_> = params
            .into_iter()
            .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v)))
            .collect();

        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        Ok(url)
    }

    /// URL for calling an API endpoint
    pub fn call_url(&self, endpoint_id: &str) -> Result<Url, ClientError> {
        self.endpoint_url(&["api-endpoints", endpoint_id, "call"])
    }

    /// Fetch a view at `version` (`None` asks for the latest)
    pub async fn fetch_view(&self, request: &ViewRequest, version: Option<u64>) -> Result<FetchResult, ClientError> {
        let url = self.view_url(request, version)?;
        debug!(%url, "ApiClient::fetch_view: called");

        let response = self.http.get(url).bearer_auth(&self.publishable_key).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(%status, "ApiClient::fetch_view: API error");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        parse_view_body(&body)
    }

    /// Call an API endpoint with a form body
    pub async fn invoke(&self, endpoint_id: &str, body: FormBody) -> Result<InvokeOutcome, ClientError> {
        let url = self.call_url(endpoint_id)?;
        debug!(%url, parts = body.parts().len(), "ApiClient::invoke: called");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.publishable_key)
            .multipart(body.into_form())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match parse_invoke_body(&text) {
            Ok(outcome) => Ok(outcome),
            Err(_) if !status.is_success() => Err(ClientError::Api {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(e),
        }
    }

    /// Call an API endpoint and offer the event id it reports to the coordinator
    ///
    /// This is the pull-side path for version advancement, next to the push
    /// channel.
    pub async fn invoke_api_endpoint(
        &self,
        coordinator: &CoordinatorHandle,
        endpoint_id: &str,
        body: FormBody,
    ) -> Result<InvokeOutcome, ClientError> {
        let outcome = self.invoke(endpoint_id, body).await?;

        if let InvokeOutcome::Success {
            event_id: Some(event_id),
            ..
        } = &outcome
        {
            match coordinator.update_version(*event_id).await {
                Ok(updated) => debug!(event_id, updated, "invoke_api_endpoint: offered event id"),
                Err(e) => warn!(event_id, error = %e, "Could not offer event id to coordinator"),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(host: &str) -> ApiClient {
        ApiClient::new(host, "pk_test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_base_url_scheme() {
        assert_eq!(client("localhost:3000").base_url().as_str(), "http://localhost:3000/");
        assert_eq!(client("api.example.com").base_url().as_str(), "https://api.example.com/");
    }

    #[test]
    fn test_view_url_with_all_params() {
        let request = ViewRequest::new("view_abc")
            .with_key(Some("user 1".to_string()))
            .with_auth_key(Some("ak&1".to_string()));
        let url = client("api.example.com").view_url(&request, Some(12)).unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.example.com/view-endpoints/view_abc/view?eventId=12&key=user+1&authKey=ak%261"
        );
    }

    #[test]
    fn test_view_url_skips_missing_params() {
        let request = ViewRequest::new("view_abc").with_key(Some(String::new()));
        let url = client("api.example.com").view_url(&request, None).unwrap();

        assert_eq!(url.as_str(), "https://api.example.com/view-endpoints/view_abc/view");
    }

    #[test]
    fn test_call_url() {
        let url = client("localhost:8080").call_url("apie_123").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api-endpoints/apie_123/call");
    }

    #[test]
    fn test_parse_view_body() {
        let result = parse_view_body(r#"{"data": {"eventId": 5, "output": {"rows": [1, 2]}}}"#).unwrap();
        assert_eq!(result, FetchResult::new(5, json!({"rows": [1, 2]})));
    }

    #[test]
    fn test_parse_view_body_errors() {
        assert!(matches!(
            parse_view_body(r#"{"data": {"output": 1}}"#),
            Err(ClientError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_view_body(r#"{"success": false, "error": {"message": "nope"}}"#),
            Err(ClientError::InvalidResponse(msg)) if msg.contains("nope")
        ));
        assert!(matches!(parse_view_body("<html>"), Err(ClientError::Json(_))));
    }

    #[test]
    fn test_parse_invoke_body() {
        assert_eq!(
            parse_invoke_body(r#"{"success": true, "data": {"eventId": 9, "output": "hi"}}"#).unwrap(),
            InvokeOutcome::Success {
                event_id: Some(9),
                output: json!("hi")
            }
        );
        assert_eq!(
            parse_invoke_body(r#"{"success": true, "data": {"output": "hi"}}"#).unwrap(),
            InvokeOutcome::Success {
                event_id: None,
                output: json!("hi")
            }
        );
        assert_eq!(
            parse_invoke_body(r#"{"success": false, "error": {"message": "bad name"}}"#).unwrap(),
            InvokeOutcome::Failure {
                error: "bad name".to_string()
            }
        );
        assert!(parse_invoke_body(r#"{"data": {}}"#).is_err());
    }

    #[test]
    fn test_client_error_into_fetch_error() {
        let err: FetchError = ClientError::Api {
            status: 503,
            message: "down".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Fetch failed: API error 503: down");
    }
}
