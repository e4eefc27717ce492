//! CDP client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the CDP client.
#[derive(Error, Debug)]
pub enum CdpError {
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket connection dropped while a call was in flight.
    #[error("WebSocket connection lost")]
    ConnectionLost,

    /// The browser answered a command with a protocol error.
    #[error("CDP protocol error {code}: {message}")]
    Protocol {
        /// Protocol error code.
        code: i64,
        /// Protocol error message.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived within the command timeout.
    #[error("response timeout after {0:?}")]
    Timeout(Duration),

    /// The debugging endpoint URL could not be parsed.
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    /// HTTP request to the discovery endpoint failed.
    #[error("endpoint discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Chromium executable could not be located.
    #[error("Chromium not found. Set CHROMIUM_PATH or install Chromium.")]
    ChromiumNotFound,

    /// Browser process could not be spawned.
    #[error("failed to spawn browser process: {0}")]
    SpawnFailed(String),

    /// The spawned browser never printed a DevTools URL.
    #[error("failed to read DevTools URL from browser output")]
    NoDebuggingUrl,

    /// Browser launch did not complete in time.
    #[error("browser launch timeout after {0:?}")]
    LaunchTimeout(Duration),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => Self::ConnectionLost,
            other => Self::ConnectionFailed(other.to_string()),
        }
    }
}
