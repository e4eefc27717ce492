//! Network domain types.
//!
//! Request/response lifecycle events used for navigation accounting and
//! network-idle detection.

use std::collections::HashMap;

use serde::Deserialize;

/// Unique request identifier.
pub type RequestId = String;

/// HTTP response data.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u32,
    /// HTTP status text.
    pub status_text: Option<String>,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Resource MIME type.
    pub mime_type: Option<String>,
}

/// Event: Network.requestWillBeSent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSentEvent {
    /// Request id.
    pub request_id: RequestId,
    /// Frame issuing the request.
    pub frame_id: Option<String>,
    /// Resource type, e.g. `"Document"`.
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// Response that redirected into this request, when following a
    /// redirect.
    pub redirect_response: Option<Response>,
}

/// Event: Network.responseReceived.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceivedEvent {
    /// Request id.
    pub request_id: RequestId,
    /// Frame the response belongs to.
    pub frame_id: Option<String>,
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// The response.
    pub response: Response,
}

/// Event: Network.loadingFinished.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinishedEvent {
    /// Request id.
    pub request_id: RequestId,
}

/// Event: Network.loadingFailed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailedEvent {
    /// Request id.
    pub request_id: RequestId,
    /// Failure description.
    pub error_text: Option<String>,
}
