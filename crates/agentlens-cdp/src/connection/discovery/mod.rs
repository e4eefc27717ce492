//! DevTools endpoint discovery over HTTP.
//!
//! A browser started with `--remote-debugging-port` serves `/json/version`
//! with the browser-level WebSocket URL. Given an HTTP endpoint this module
//! resolves that URL; WebSocket URLs pass through untouched.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::CdpError;

/// Default timeout for endpoint discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Response from the `/json/version` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVersion {
    /// Browser name and version.
    pub browser: Option<String>,
    /// Protocol version.
    pub protocol_version: Option<String>,
    /// User agent string.
    pub user_agent: Option<String>,
    /// Browser-level CDP WebSocket URL.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Resolve a debugging endpoint to a browser-level WebSocket URL.
///
/// Accepts `http(s)://host:port` endpoints (queried via `/json/version`)
/// as well as `ws(s)://` URLs, which are returned as-is.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the HTTP request fails, or the
/// response carries no WebSocket URL.
#[instrument(level = "info")]
pub async fn discover_websocket_url(endpoint_url: &str) -> Result<String, CdpError> {
    let base_url = Url::parse(endpoint_url)
        .map_err(|e| CdpError::InvalidEndpointUrl(format!("{endpoint_url}: {e}")))?;

    if base_url.scheme() == "ws" || base_url.scheme() == "wss" {
        debug!("Endpoint is already a WebSocket URL");
        return Ok(endpoint_url.to_string());
    }

    if base_url.scheme() != "http" && base_url.scheme() != "https" {
        return Err(CdpError::InvalidEndpointUrl(format!(
            "expected http, https, ws or wss scheme, got: {}",
            base_url.scheme()
        )));
    }

    let version_url = base_url
        .join("/json/version")
        .map_err(|e| CdpError::InvalidEndpointUrl(format!("failed to build version URL: {e}")))?;
    info!(url = %version_url, "Discovering WebSocket URL");

    let client = reqwest::Client::builder()
        .timeout(DEFAULT_DISCOVERY_TIMEOUT)
        .build()
        .map_err(|e| CdpError::DiscoveryFailed(e.to_string()))?;

    let response = client
        .get(version_url.as_str())
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() {
                CdpError::ConnectionFailed(format!("failed to connect to {endpoint_url}: {e}"))
            } else {
                CdpError::DiscoveryFailed(e.to_string())
            }
        })?;

    if !response.status().is_success() {
        return Err(CdpError::DiscoveryFailed(format!(
            "{version_url} answered {}",
            response.status()
        )));
    }

    let version: BrowserVersion = response
        .json()
        .await
        .map_err(|e| CdpError::DiscoveryFailed(e.to_string()))?;

    version
        .web_socket_debugger_url
        .ok_or_else(|| CdpError::DiscoveryFailed("no webSocketDebuggerUrl in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn websocket_url_passes_through() {
        let url = "ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(discover_websocket_url(url).await.unwrap(), url);
    }

    #[tokio::test]
    async fn rejects_unknown_scheme() {
        let err = discover_websocket_url("ftp://example.com").await.unwrap_err();
        assert!(matches!(err, CdpError::InvalidEndpointUrl(_)));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let err = discover_websocket_url("not a url").await.unwrap_err();
        assert!(matches!(err, CdpError::InvalidEndpointUrl(_)));
    }
}
